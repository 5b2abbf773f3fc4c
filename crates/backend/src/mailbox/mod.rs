//! Mailbox access used by the pipeline.

mod gmail_client;

pub use gmail_client::GmailClient;

use anyhow::Result;
use async_trait::async_trait;
use shared_types::RawMessage;

/// Messages referenced by one history record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryEntry {
    pub message_ids: Vec<String>,
}

/// Result of (re-)establishing a push-notification watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchStatus {
    pub history_id: Option<u64>,
    /// Expiration in milliseconds since the epoch
    pub expiration: Option<i64>,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch one message by id.
    async fn fetch_message(&self, message_id: &str) -> Result<RawMessage>;

    /// History records since the cursor, oldest first, across all pages.
    async fn list_history(&self, start_history_id: u64) -> Result<Vec<HistoryEntry>>;

    /// Ids of every inbox message, newest first.
    async fn list_inbox(&self) -> Result<Vec<String>>;

    /// Re-establish the push subscription on a topic for the given labels.
    async fn watch(&self, topic: &str, label_ids: &[String]) -> Result<WatchStatus>;
}
