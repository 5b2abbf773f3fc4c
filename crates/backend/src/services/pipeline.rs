//! Filter, classify, dedupe and persist mailbox messages.
//!
//! Each batch run (webhook history delta, full inbox scan, single-message
//! test) drives messages one at a time through [`Pipeline::process_message`]
//! and tallies the outcomes into a [`BatchReport`]. Failures are scoped:
//! a message that cannot be fetched is skipped, while classifier and store
//! failures are reported according to the run mode.

use shared_types::{ApplicationSnapshot, JobApplicationRecord, NormalizedMessage, SenderFilter};
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{classify_with_retry, Classifier};
use crate::error::PipelineError;
use crate::mailbox::{Mailbox, WatchStatus};
use crate::pacing::{Pacer, RetryPolicy};
use crate::sheets::ApplicationStore;

/// Tunables shared by every run mode.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub filter: SenderFilter,
    /// Wait between consecutive messages of a full scan
    pub message_delay: Duration,
    pub retry: RetryPolicy,
    /// Apply the dedup gate to webhook deliveries too
    pub webhook_dedupe: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            filter: SenderFilter::default(),
            message_delay: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            webhook_dedupe: false,
        }
    }
}

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Sender is on the denylist; the classifier was not called
    Filtered { sender: String },
    NotApplication(JobApplicationRecord),
    /// Already present in the snapshot
    Duplicate(JobApplicationRecord),
    Appended(JobApplicationRecord),
}

impl MessageOutcome {
    pub fn record(&self) -> Option<&JobApplicationRecord> {
        match self {
            MessageOutcome::Filtered { .. } => None,
            MessageOutcome::NotApplication(r)
            | MessageOutcome::Duplicate(r)
            | MessageOutcome::Appended(r) => Some(r),
        }
    }
}

/// A message skipped because of an upstream failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    pub message_id: String,
    pub error: String,
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub seen: usize,
    pub filtered: usize,
    pub not_applications: usize,
    pub duplicates: usize,
    pub appended: Vec<JobApplicationRecord>,
    pub failures: Vec<MessageFailure>,
    /// Set when the run stopped before the last message
    pub aborted: Option<PipelineError>,
}

impl BatchReport {
    fn tally(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Filtered { .. } => self.filtered += 1,
            MessageOutcome::NotApplication(_) => self.not_applications += 1,
            MessageOutcome::Duplicate(_) => self.duplicates += 1,
            MessageOutcome::Appended(record) => self.appended.push(record),
        }
    }

    fn skip(&mut self, error: PipelineError) {
        tracing::warn!("Skipping message: {}", error.detailed());
        self.failures.push(MessageFailure {
            message_id: error.message_id().unwrap_or_default().to_string(),
            error: error.detailed(),
        });
    }

    fn abort(&mut self, error: PipelineError) {
        tracing::error!("Aborting batch: {}", error.detailed());
        self.aborted = Some(error);
    }

    /// True when the run stopped because the classifier failed.
    pub fn aborted_by_classifier(&self) -> bool {
        matches!(self.aborted, Some(PipelineError::Classify { .. }))
    }

    fn log_summary(&self, mode: &str) {
        tracing::info!(
            "{} finished: {} seen, {} filtered, {} not applications, {} duplicates, {} appended, {} failed",
            mode,
            self.seen,
            self.filtered,
            self.not_applications,
            self.duplicates,
            self.appended.len(),
            self.failures.len()
        );
    }
}

/// Service sequencing the mailbox, classifier and store adapters.
pub struct Pipeline {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn ApplicationStore>,
    pacer: Arc<dyn Pacer>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn ApplicationStore>,
        pacer: Arc<dyn Pacer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            store,
            pacer,
            settings,
        }
    }

    /// Fetch, filter, classify and (when positive) persist one message.
    ///
    /// With a snapshot the record is only appended when it is not already
    /// stored, and the snapshot is updated after a successful append.
    /// Without one every positive verdict is appended.
    pub async fn process_message(
        &self,
        message_id: &str,
        snapshot: Option<&mut ApplicationSnapshot>,
    ) -> Result<MessageOutcome, PipelineError> {
        let raw = self
            .mailbox
            .fetch_message(message_id)
            .await
            .map_err(|source| PipelineError::Fetch {
                message_id: message_id.to_string(),
                source,
            })?;

        let message = NormalizedMessage::from_raw(&raw);
        self.evaluate(message_id, &message, snapshot).await
    }

    async fn evaluate(
        &self,
        message_id: &str,
        message: &NormalizedMessage,
        snapshot: Option<&mut ApplicationSnapshot>,
    ) -> Result<MessageOutcome, PipelineError> {
        if !self.settings.filter.is_allowed(&message.sender) {
            tracing::debug!("Message {} from denied sender {}", message_id, message.sender);
            return Ok(MessageOutcome::Filtered {
                sender: message.sender.clone(),
            });
        }

        let verdict = classify_with_retry(
            self.classifier.as_ref(),
            self.pacer.as_ref(),
            &self.settings.retry,
            &message.classifier_input(),
        )
        .await
        .map_err(|source| PipelineError::Classify {
            message_id: message_id.to_string(),
            source,
        })?;

        tracing::debug!("Verdict for message {}: {:?}", message_id, verdict);

        let record =
            JobApplicationRecord::parse_verdict(&verdict).with_fallback_date(&message.date);

        if !record.is_application_response() {
            return Ok(MessageOutcome::NotApplication(record));
        }

        if snapshot.as_deref().is_some_and(|s| s.exists(&record)) {
            tracing::debug!(
                "Message {} duplicates {} / {} / {}",
                message_id,
                record.company,
                record.role,
                record.date_applied
            );
            return Ok(MessageOutcome::Duplicate(record));
        }

        self.store
            .append(&record)
            .await
            .map_err(|source| PipelineError::Append {
                message_id: message_id.to_string(),
                source,
            })?;

        if let Some(snapshot) = snapshot {
            snapshot.record(record.clone());
        }

        Ok(MessageOutcome::Appended(record))
    }

    async fn load_snapshot(&self) -> Result<ApplicationSnapshot, PipelineError> {
        self.store
            .load_snapshot()
            .await
            .map_err(PipelineError::Snapshot)
    }

    /// Process every message added since the history cursor.
    ///
    /// Unfetchable messages are skipped; a classifier or store failure stops
    /// the batch and is reported in [`BatchReport::aborted`].
    pub async fn run_history_delta(&self, history_id: u64) -> Result<BatchReport, PipelineError> {
        let entries = self
            .mailbox
            .list_history(history_id)
            .await
            .map_err(|source| PipelineError::History { history_id, source })?;

        let mut snapshot = if self.settings.webhook_dedupe {
            Some(self.load_snapshot().await?)
        } else {
            None
        };

        tracing::info!(
            "Processing {} history records since {}",
            entries.len(),
            history_id
        );

        let mut report = BatchReport::default();
        for message_id in entries.iter().flat_map(|entry| &entry.message_ids) {
            report.seen += 1;
            match self.process_message(message_id, snapshot.as_mut()).await {
                Ok(outcome) => report.tally(outcome),
                Err(e @ PipelineError::Fetch { .. }) => report.skip(e),
                Err(e) => {
                    report.abort(e);
                    break;
                }
            }
        }

        report.log_summary("History delta");
        Ok(report)
    }

    /// Deduplicating pass over the given messages, pacing between them.
    ///
    /// Fetch and classifier failures skip the message; a store failure stops
    /// the run.
    pub async fn run_full_scan(&self, message_ids: &[String]) -> Result<BatchReport, PipelineError> {
        let mut snapshot = self.load_snapshot().await?;
        let mut report = BatchReport::default();

        for (index, message_id) in message_ids.iter().enumerate() {
            if index > 0 {
                self.pacer.wait(self.settings.message_delay).await;
            }

            report.seen += 1;
            match self.process_message(message_id, Some(&mut snapshot)).await {
                Ok(outcome) => report.tally(outcome),
                Err(e @ (PipelineError::Fetch { .. } | PipelineError::Classify { .. })) => {
                    report.skip(e)
                }
                Err(e) => {
                    report.abort(e);
                    break;
                }
            }
        }

        report.log_summary("Full scan");
        Ok(report)
    }

    /// Backfill: scan every message currently in the inbox.
    pub async fn scan_inbox(&self) -> Result<BatchReport, PipelineError> {
        let ids = self
            .mailbox
            .list_inbox()
            .await
            .map_err(PipelineError::Listing)?;

        tracing::info!("Scanning {} inbox messages", ids.len());
        self.run_full_scan(&ids).await
    }

    /// Classify the most recent inbox message, appending it through the
    /// dedup gate when positive. Returns `None` for an empty inbox.
    pub async fn classify_latest(&self) -> Result<Option<MessageOutcome>, PipelineError> {
        let ids = self
            .mailbox
            .list_inbox()
            .await
            .map_err(PipelineError::Listing)?;

        let Some(message_id) = ids.first() else {
            tracing::info!("Inbox is empty, nothing to classify");
            return Ok(None);
        };

        let raw = self
            .mailbox
            .fetch_message(message_id)
            .await
            .map_err(|source| PipelineError::Fetch {
                message_id: message_id.clone(),
                source,
            })?;
        let message = NormalizedMessage::from_raw(&raw);
        tracing::info!("Latest message {}: {:?}", message_id, message);

        let mut snapshot = self.load_snapshot().await?;
        let outcome = self
            .evaluate(message_id, &message, Some(&mut snapshot))
            .await?;

        match outcome.record() {
            Some(record) => tracing::info!("Classification:\n{}", record.to_verdict_text()),
            None => tracing::info!("Sender {} is filtered, not classified", message.sender),
        }

        Ok(Some(outcome))
    }

    /// Re-establish the push subscription for the tracked mailbox.
    pub async fn refresh_watch(
        &self,
        topic: &str,
        label_ids: &[String],
    ) -> Result<WatchStatus, PipelineError> {
        if topic.is_empty() {
            return Err(PipelineError::Watch(anyhow::anyhow!(
                "No watch topic configured"
            )));
        }

        self.mailbox
            .watch(topic, label_ids)
            .await
            .map_err(PipelineError::Watch)
    }
}
