//! Error types for the pipeline and the HTTP edge.
//!
//! `PipelineError` scopes every upstream failure to the message or run it
//! happened in. `ApiError` implements `IntoResponse` so handlers can use `?`
//! and still answer with a proper status code and JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure of a single pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The mailbox could not return the message
    #[error("failed to fetch message {message_id}")]
    Fetch {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The classifier call failed or returned nothing
    #[error("failed to classify message {message_id}")]
    Classify {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Listing history since a cursor failed
    #[error("failed to list mailbox history since {history_id}")]
    History {
        history_id: u64,
        #[source]
        source: anyhow::Error,
    },

    /// Listing inbox messages failed
    #[error("failed to list inbox messages")]
    Listing(#[source] anyhow::Error),

    /// Loading the dedup snapshot failed
    #[error("failed to load existing applications")]
    Snapshot(#[source] anyhow::Error),

    /// Writing a row failed
    #[error("failed to append application from message {message_id}")]
    Append {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Re-establishing the mailbox watch failed
    #[error("failed to establish mailbox watch")]
    Watch(#[source] anyhow::Error),
}

impl PipelineError {
    /// Message the failure belongs to, when it is scoped to one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            PipelineError::Fetch { message_id, .. }
            | PipelineError::Classify { message_id, .. }
            | PipelineError::Append { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    /// Error text including the whole source chain.
    pub fn detailed(&self) -> String {
        use std::error::Error;

        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            text.push_str(": ");
            text.push_str(&err.to_string());
            source = err.source();
        }
        text
    }
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// JSON parsing error
    #[error("Invalid JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Upstream failure while running the pipeline
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Generic internal error
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone(), None)
            }
            ApiError::JsonParse(e) => {
                tracing::warn!("JSON parse error: {:?}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid JSON format".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Pipeline(e) => {
                tracing::error!("Pipeline error: {}", e.detailed());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.to_string(),
                    Some(e.detailed()),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(e.to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
