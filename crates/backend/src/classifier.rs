//! Language-model classification of normalized messages.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pacing::{Pacer, RetryPolicy};

/// System instruction describing the two-section verdict format.
pub const DEFAULT_SYSTEM_PROMPT: &str = concat!(
    "You are a system who can classify the subject, sender, ",
    "and content of an email and be able to classify whether the email is a job application response email.",
    "These emails are ones companies send out when you have applied for a job. You will respond in two sections, ",
    "and the format must be consistent and parseable. The first section is the classification, which will look like this\n",
    "Classification: (Application Response | Other).\n",
    "The second section is lines of application details, which all will just say N/A if the email is not an application response email.",
    "The information I'd like you to try to extract from the email is: Company, Role, and Date Applied.",
    "Always list that information on a new line in that order, even if you can't find the information, then put down N/A.\n ",
    "Example: Classification: Application Response\nCompany: Google\nRole: Software Engineer\nDate Applied: 2022-01-01\n",
    "Example 2: Classification: Other\nCompany: N/A\nRole: N/A\nDate Applied: N/A\n",
);

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Return the model's free-text verdict for a formatted message.
    async fn classify(&self, message: &str) -> Result<String>;
}

/// Settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 256,
            temperature: 0.5,
            timeout_secs: 30,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClassifier {
    client: reqwest::Client,
    config: ClassifierConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    fn build_request<'a>(&'a self, message: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

/// First non-empty completion text, if the response carries one.
fn first_completion(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, message: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(message))
            .send()
            .await
            .context("Chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion failed with status {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Invalid chat completion response")?;

        first_completion(completion).context("No completion choices returned")
    }
}

/// Classify with bounded retries, waiting through the pacer between attempts.
pub async fn classify_with_retry(
    classifier: &dyn Classifier,
    pacer: &dyn Pacer,
    policy: &RetryPolicy,
    message: &str,
) -> Result<String> {
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match classifier.classify(message).await {
            Ok(verdict) => return Ok(verdict),
            Err(e) if attempt < attempts => {
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    "Classification attempt {}/{} failed, retrying in {:?}: {:#}",
                    attempt,
                    attempts,
                    delay,
                    e
                );
                pacer.wait(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("Classification failed after {} attempt(s)", attempt)))
            }
        }
    }
}
