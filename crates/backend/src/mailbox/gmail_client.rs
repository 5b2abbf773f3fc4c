//! Gmail API client for the impersonated tracker account.

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::api::{Message, MessagePart, Scope, WatchRequest};
use google_gmail1::hyper_rustls::HttpsConnector;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::{RawHeader, RawMessage, RawPart};

use super::{HistoryEntry, Mailbox, WatchStatus};
use crate::auth::{self, ServiceAccount};

/// Client for interacting with Gmail API
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    pub user_email: String,
}

impl GmailClient {
    /// Create a client acting as `user_email` through domain-wide delegation.
    pub async fn impersonating(account: &ServiceAccount, user_email: &str) -> Result<Self> {
        let auth = auth::authenticator(account, Some(user_email))
            .await
            .context("Failed to build Gmail authenticator")?;

        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = Gmail::new(client, auth);

        Ok(Self {
            hub,
            user_email: user_email.to_string(),
        })
    }

    fn to_raw_message(message: Message) -> RawMessage {
        let id = message.id.unwrap_or_default();
        let internal_date_ms = message.internal_date.unwrap_or_default();

        let Some(payload) = message.payload else {
            return RawMessage {
                id,
                internal_date_ms,
                ..Default::default()
            };
        };

        let headers = payload
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|h| RawHeader {
                name: h.name.unwrap_or_default(),
                value: h.value.unwrap_or_default(),
            })
            .collect();

        let body = payload.body.and_then(|b| b.data);
        let parts = payload
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(Self::to_raw_part)
            .collect();

        RawMessage {
            id,
            headers,
            body,
            parts,
            internal_date_ms,
        }
    }

    fn to_raw_part(part: MessagePart) -> RawPart {
        RawPart {
            mime_type: part.mime_type.unwrap_or_default(),
            body: part.body.and_then(|b| b.data),
        }
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn fetch_message(&self, message_id: &str) -> Result<RawMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get(&self.user_email, message_id)
            .format("full")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Failed to get message")?;

        Ok(Self::to_raw_message(message))
    }

    async fn list_history(&self, start_history_id: u64) -> Result<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .history_list(&self.user_email)
                .start_history_id(start_history_id)
                .add_scope(Scope::Modify);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, response) = call.doit().await.context("Failed to list history")?;

            for history in response.history.unwrap_or_default() {
                let message_ids = history
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id)
                    .collect();
                entries.push(HistoryEntry { message_ids });
            }

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(
            "Listed {} history records since {}",
            entries.len(),
            start_history_id
        );

        Ok(entries)
    }

    async fn list_inbox(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .messages_list(&self.user_email)
                .q("in:inbox")
                .add_scope(Scope::Modify);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, response) = call.doit().await.context("Failed to list messages")?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn watch(&self, topic: &str, label_ids: &[String]) -> Result<WatchStatus> {
        let request = WatchRequest {
            topic_name: Some(topic.to_string()),
            label_ids: Some(label_ids.to_vec()),
            label_filter_action: Some("include".to_string()),
            ..Default::default()
        };

        let (_, response) = self
            .hub
            .users()
            .watch(request, &self.user_email)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Failed to set up watch")?;

        tracing::info!(
            "Watch established on {} (history id {:?}, expires {:?})",
            self.user_email,
            response.history_id,
            response.expiration
        );

        Ok(WatchStatus {
            history_id: response.history_id,
            expiration: response.expiration,
        })
    }
}
