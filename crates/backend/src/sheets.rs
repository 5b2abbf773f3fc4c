//! Spreadsheet persistence for accepted applications.

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::common::GetToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ApplicationSnapshot, JobApplicationRecord};
use std::time::Duration;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Append-only table of (Company, Role, Date Applied) rows.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Every stored row, in sheet order.
    async fn load_snapshot(&self) -> Result<ApplicationSnapshot>;

    async fn append(&self, record: &JobApplicationRecord) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Range rows are appended to
    pub append_range: String,
    /// Range read for deduplication, excluding the header row
    pub read_range: String,
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            append_range: "Applications".to_string(),
            read_range: "Applications!A2:C".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct AppendBody {
    values: Vec<[String; 3]>,
}

/// Google Sheets values API, authenticated with the service account.
pub struct SheetsStore {
    client: reqwest::Client,
    auth: Box<dyn GetToken>,
    config: SheetsConfig,
}

impl SheetsStore {
    pub fn new(auth: impl GetToken + 'static, config: SheetsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            auth: Box::new(auth),
            config,
        })
    }

    async fn access_token(&self) -> Result<String> {
        self.auth
            .get_token(&[SHEETS_SCOPE])
            .await
            .map_err(|e| anyhow::anyhow!("Failed to obtain Sheets token: {}", e))?
            .context("No Sheets access token issued")
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API,
            urlencoding::encode(&self.config.spreadsheet_id),
            urlencoding::encode(range)
        )
    }
}

/// Render a cell as the text a reader of the sheet would see.
fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn snapshot_from_values(range: ValueRange) -> ApplicationSnapshot {
    range
        .values
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            JobApplicationRecord::from_row(&cells)
        })
        .collect()
}

#[async_trait]
impl ApplicationStore for SheetsStore {
    async fn load_snapshot(&self) -> Result<ApplicationSnapshot> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(self.values_url(&self.config.read_range))
            .bearer_auth(token)
            .send()
            .await
            .context("Sheets read request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets read failed with status {}: {}", status, body);
        }

        let range: ValueRange = response
            .json()
            .await
            .context("Invalid Sheets read response")?;

        let snapshot = snapshot_from_values(range);
        if snapshot.is_empty() {
            tracing::info!("No existing applications found in sheet");
        } else {
            tracing::info!("Loaded {} existing applications", snapshot.len());
        }

        Ok(snapshot)
    }

    async fn append(&self, record: &JobApplicationRecord) -> Result<()> {
        let token = self.access_token().await?;
        let url = format!("{}:append", self.values_url(&self.config.append_range));

        let response = self
            .client
            .post(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&AppendBody {
                values: vec![record.to_row()],
            })
            .send()
            .await
            .context("Sheets append request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets append failed with status {}: {}", status, body);
        }

        tracing::info!(
            "Appended application: {} / {} / {}",
            record.company,
            record.role,
            record.date_applied
        );
        Ok(())
    }
}
