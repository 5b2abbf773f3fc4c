//! Google service-account credentials.
//!
//! One key file backs both the Gmail hub (impersonating the tracker account
//! through domain-wide delegation) and the Sheets store.

use anyhow::{Context, Result};
use google_gmail1::common::GetToken;
use google_gmail1::yup_oauth2::{self, ServiceAccountAuthenticator, ServiceAccountKey};
use std::path::Path;

/// Parsed service-account key.
#[derive(Clone)]
pub struct ServiceAccount {
    key: ServiceAccountKey,
}

impl ServiceAccount {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read service account key {}", path.display()))?;

        let account = Self::from_json(&json)?;
        tracing::debug!("Loaded service account {}", account.client_email());

        Ok(account)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let key = yup_oauth2::parse_service_account_key(json)
            .context("Failed to parse service account key")?;
        Ok(Self { key })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }
}

/// Build a token source for the service account, optionally impersonating
/// `subject`.
pub async fn authenticator(
    account: &ServiceAccount,
    subject: Option<&str>,
) -> Result<impl GetToken + Clone + 'static> {
    let key = account.key.clone();
    let subject = subject.map(str::to_string);

    let mut builder = ServiceAccountAuthenticator::builder(key);
    if let Some(subject) = subject {
        builder = builder.subject(subject);
    }

    builder
        .build()
        .await
        .context("Failed to build service account authenticator")
}
