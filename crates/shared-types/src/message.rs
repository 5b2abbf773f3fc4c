use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A single header as returned by the mailbox provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

/// A top-level MIME part of a mailbox message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPart {
    pub mime_type: String,
    /// Decoded body bytes (the provider transports them as base64url).
    pub body: Option<Vec<u8>>,
}

/// Provider-neutral view of a fetched mailbox message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub headers: Vec<RawHeader>,
    /// Body attached directly to the message payload, if any.
    pub body: Option<Vec<u8>>,
    pub parts: Vec<RawPart>,
    /// Server-assigned receive time in milliseconds since the epoch.
    pub internal_date_ms: i64,
}

/// Subject, sender, plain-text body and receive date of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// Calendar date (`YYYY-MM-DD`, UTC) derived from the internal timestamp.
    pub date: String,
}

impl NormalizedMessage {
    /// Normalize a raw message.
    ///
    /// Header names are matched exactly; when a header repeats the last
    /// occurrence wins. The body comes from the payload itself when present,
    /// otherwise from the first top-level `text/plain` part. The date comes
    /// from the server timestamp rather than the `Date` header, which the
    /// sender controls.
    pub fn from_raw(raw: &RawMessage) -> Self {
        let mut subject = String::new();
        let mut sender = String::new();

        for header in &raw.headers {
            match header.name.as_str() {
                "Subject" => subject = header.value.clone(),
                "From" => sender = header.value.clone(),
                _ => {}
            }
        }

        Self {
            subject,
            sender,
            body: Self::extract_body(raw),
            date: Self::format_date(raw.internal_date_ms),
        }
    }

    /// Text handed to the classifier as the user turn.
    pub fn classifier_input(&self) -> String {
        format!(
            "Subject: {}\nFrom: {}\n\n{}",
            self.subject, self.sender, self.body
        )
    }

    fn extract_body(raw: &RawMessage) -> String {
        if let Some(data) = raw.body.as_deref().filter(|d| !d.is_empty()) {
            return String::from_utf8_lossy(data).into_owned();
        }

        raw.parts
            .iter()
            .find(|part| part.mime_type.starts_with("text/plain"))
            .and_then(|part| part.body.as_deref())
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default()
    }

    fn format_date(internal_date_ms: i64) -> String {
        DateTime::from_timestamp_millis(internal_date_ms)
            .unwrap_or_default()
            .format("%Y-%m-%d")
            .to_string()
    }
}

impl From<&RawMessage> for NormalizedMessage {
    fn from(raw: &RawMessage) -> Self {
        Self::from_raw(raw)
    }
}
