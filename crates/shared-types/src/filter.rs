use serde::{Deserialize, Serialize};

/// Automated senders whose mail never needs classifying.
pub const DEFAULT_DENIED_SENDERS: &[&str] = &[
    "workspace@google.com",
    "workspace-noreply@google.com",
    "cloud-noreply@google.com",
    "no-reply@leetcode.com",
    "resumeworded.com",
    "google-workspace-alerts-noreply@google.com",
    "gtaanm@microsoft.com",
    "security-noreply@linkedin.com",
    "analytics-noreply@google.com",
    "jobscan.co",
    "noreply@glassdoor.com",
    "verify@crossover.com",
    "CloudPlatform-noreply@google.com",
    "PlatformNotifications-noreply@google.com",
    "info@glassdoor.com",
    "googlecloud@google.com",
    "no-reply@accounts.google.com",
];

/// Allow/deny gate applied to the `From` header before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderFilter {
    denied: Vec<String>,
}

impl SenderFilter {
    pub fn new<I, S>(denied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied: denied.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns false when the sender contains any denied entry as a substring.
    pub fn is_allowed(&self, sender: &str) -> bool {
        !self
            .denied
            .iter()
            .any(|entry| sender.contains(entry.as_str()))
    }

    pub fn denied(&self) -> &[String] {
        &self.denied
    }
}

impl Default for SenderFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENIED_SENDERS.iter().copied())
    }
}
