use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared_types::SenderFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::ClassifierConfig;
use crate::pacing::RetryPolicy;
use crate::services::PipelineSettings;
use crate::sheets::SheetsConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the webhook server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Path to the service account key JSON file
    #[serde(default)]
    pub service_account_key: PathBuf,

    /// Mailbox the service account impersonates
    #[serde(default)]
    pub impersonate_user: String,

    /// Pub/Sub topic push notifications are published to
    #[serde(default)]
    pub watch_topic: String,

    #[serde(default = "default_watch_labels")]
    pub watch_label_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delay between messages during a full scan (seconds)
    #[serde(default = "default_message_delay")]
    pub message_delay_secs: u64,

    /// Total classifier attempts per message
    #[serde(default = "default_max_attempts")]
    pub classifier_max_attempts: u32,

    /// Delay before the first classifier retry (seconds)
    #[serde(default = "default_backoff")]
    pub classifier_backoff_secs: u64,

    /// Check webhook candidates against the sheet before appending
    #[serde(default)]
    pub webhook_dedupe: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub denied_senders: SenderFilter,
}

fn default_port() -> u16 {
    8080
}

fn default_watch_labels() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_message_delay() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            google: GoogleConfig::default(),
            classifier: ClassifierConfig::default(),
            sheets: SheetsConfig::default(),
            pipeline: PipelineConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            service_account_key: PathBuf::new(),
            impersonate_user: String::new(),
            watch_topic: String::new(),
            watch_label_ids: default_watch_labels(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            message_delay_secs: default_message_delay(),
            classifier_max_attempts: default_max_attempts(),
            classifier_backoff_secs: default_backoff(),
            webhook_dedupe: false,
        }
    }
}

impl Config {
    /// Read the optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {}", key, value))
        }

        if let Some(v) = var("PORT") {
            self.port = parsed("PORT", v)?;
        }
        if let Some(v) = var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            self.google.service_account_key = PathBuf::from(v);
        }
        if let Some(v) = var("GMAIL_IMPERSONATE_USER") {
            self.google.impersonate_user = v;
        }
        if let Some(v) = var("GMAIL_WATCH_TOPIC") {
            self.google.watch_topic = v;
        }
        if let Some(v) = var("SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.classifier.api_key = v;
        }
        if let Some(v) = var("OPENAI_API_BASE") {
            self.classifier.api_base = v;
        }
        if let Some(v) = var("OPENAI_MODEL") {
            self.classifier.model = v;
        }
        if let Some(v) = var("SCAN_MESSAGE_DELAY_SECS") {
            self.pipeline.message_delay_secs = parsed("SCAN_MESSAGE_DELAY_SECS", v)?;
        }
        if let Some(v) = var("CLASSIFIER_MAX_ATTEMPTS") {
            self.pipeline.classifier_max_attempts = parsed("CLASSIFIER_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = var("WEBHOOK_DEDUPE") {
            self.pipeline.webhook_dedupe = parsed("WEBHOOK_DEDUPE", v)?;
        }

        Ok(())
    }

    /// Fail with every missing required setting listed.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.google.service_account_key.as_os_str().is_empty() {
            missing.push("GOOGLE_SERVICE_ACCOUNT_KEY");
        }
        if self.google.impersonate_user.is_empty() {
            missing.push("GMAIL_IMPERSONATE_USER");
        }
        if self.sheets.spreadsheet_id.is_empty() {
            missing.push("SPREADSHEET_ID");
        }
        if self.classifier.api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }

        if !missing.is_empty() {
            anyhow::bail!("Missing required configuration: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            filter: self.filter.denied_senders.clone(),
            message_delay: Duration::from_secs(self.pipeline.message_delay_secs),
            retry: RetryPolicy {
                max_attempts: self.pipeline.classifier_max_attempts,
                initial_backoff: Duration::from_secs(self.pipeline.classifier_backoff_secs),
            },
            webhook_dedupe: self.pipeline.webhook_dedupe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.google.watch_label_ids, vec!["INBOX"]);
        assert_eq!(config.sheets.read_range, "Applications!A2:C");
        assert_eq!(config.pipeline.message_delay_secs, 3);
        assert!(!config.pipeline.webhook_dedupe);
        assert_eq!(config.filter.denied_senders, SenderFilter::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [google]
            impersonate_user = "tracker@example.com"

            [filter]
            denied_senders = ["noreply@example.com"]

            [pipeline]
            webhook_dedupe = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.google.impersonate_user, "tracker@example.com");
        assert_eq!(config.google.watch_label_ids, vec!["INBOX"]);
        assert_eq!(config.classifier.model, "gpt-3.5-turbo");
        assert_eq!(config.pipeline.message_delay_secs, 3);
        assert!(config.pipeline.webhook_dedupe);
        assert!(!config.filter.denied_senders.is_allowed("Bot <noreply@example.com>"));
        assert!(config.filter.denied_senders.is_allowed("no-reply@leetcode.com"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("PORT", "9000"),
                ("GOOGLE_SERVICE_ACCOUNT_KEY", "/secrets/key.json"),
                ("GMAIL_IMPERSONATE_USER", "tracker@example.com"),
                ("SPREADSHEET_ID", "sheet123"),
                ("OPENAI_API_KEY", "sk-test"),
                ("SCAN_MESSAGE_DELAY_SECS", "0"),
                ("WEBHOOK_DEDUPE", "true"),
            ]))
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.google.service_account_key,
            PathBuf::from("/secrets/key.json")
        );
        assert_eq!(config.sheets.spreadsheet_id, "sheet123");
        assert!(config.validate().is_ok());

        let settings = config.pipeline_settings();
        assert_eq!(settings.message_delay, Duration::ZERO);
        assert!(settings.webhook_dedupe);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_validate_lists_missing_settings() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("GOOGLE_SERVICE_ACCOUNT_KEY"));
        assert!(err.contains("GMAIL_IMPERSONATE_USER"));
        assert!(err.contains("SPREADSHEET_ID"));
        assert!(err.contains("OPENAI_API_KEY"));
    }
}
