//! Pub/Sub push delivery decoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::error::ApiError;

/// Body of a Pub/Sub push request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Standard base64 encoding of a [`MailboxNotification`]
    pub data: String,
    #[serde(default)]
    pub message_id: String,
}

/// Gmail change notification carried in the push message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxNotification {
    pub email_address: String,
    pub history_id: u64,
}

impl PushEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, ApiError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode the mailbox notification from the message data.
    pub fn notification(&self) -> Result<MailboxNotification, ApiError> {
        let decoded = STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| ApiError::bad_request(format!("Invalid message data encoding: {}", e)))?;

        serde_json::from_slice(&decoded)
            .map_err(|e| ApiError::bad_request(format!("Invalid mailbox notification: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(data: &str) -> String {
        serde_json::json!({
            "message": {
                "data": data,
                "attributes": {},
                "messageId": "2070443601311540",
                "publishTime": "2024-03-01T15:30:00Z"
            },
            "subscription": "projects/tracker/subscriptions/gmail-push"
        })
        .to_string()
    }

    #[test]
    fn test_decode_notification() {
        let data = STANDARD.encode(r#"{"emailAddress":"tracker@example.com","historyId":9876543}"#);
        let envelope = PushEnvelope::from_slice(envelope(&data).as_bytes()).unwrap();

        assert_eq!(envelope.message.message_id, "2070443601311540");
        assert_eq!(
            envelope.notification().unwrap(),
            MailboxNotification {
                email_address: "tracker@example.com".to_string(),
                history_id: 9876543,
            }
        );
    }

    #[test]
    fn test_non_json_body() {
        assert!(matches!(
            PushEnvelope::from_slice(b"not json"),
            Err(ApiError::JsonParse(_))
        ));
    }

    #[test]
    fn test_bad_base64() {
        let envelope = PushEnvelope::from_slice(envelope("***").as_bytes()).unwrap();
        assert!(matches!(
            envelope.notification(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_history_id_must_be_numeric() {
        let data = STANDARD.encode(r#"{"emailAddress":"tracker@example.com","historyId":"abc"}"#);
        let envelope = PushEnvelope::from_slice(envelope(&data).as_bytes()).unwrap();
        assert!(matches!(
            envelope.notification(),
            Err(ApiError::BadRequest(_))
        ));
    }
}
