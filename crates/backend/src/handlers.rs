use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::error::{ApiResult, PipelineError};
use crate::pubsub::PushEnvelope;
use crate::services::Pipeline;

/// Topic and labels the mailbox watch is registered with.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub topic: String,
    pub label_ids: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub watch: WatchTarget,
    /// Held for the duration of a webhook batch
    batch_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, watch: WatchTarget) -> Self {
        Self {
            pipeline,
            watch,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/message", post(receive_message))
        .route("/refresh", post(refresh_watch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Pub/Sub push endpoint: process the mailbox history since the notified
/// cursor.
pub async fn receive_message(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let envelope = PushEnvelope::from_slice(&body)?;
    let notification = envelope.notification()?;

    tracing::info!(
        "Push {} from {} for {} at history {}",
        envelope.message.message_id,
        envelope.subscription,
        notification.email_address,
        notification.history_id
    );

    let _batch = state.batch_lock.lock().await;
    let report = state
        .pipeline
        .run_history_delta(notification.history_id)
        .await?;

    match report.aborted {
        None => Ok(StatusCode::OK),
        Some(PipelineError::Classify { .. }) => Ok(StatusCode::NO_CONTENT),
        Some(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub history_id: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn refresh_watch(State(state): State<AppState>) -> ApiResult<Json<WatchResponse>> {
    let status = state
        .pipeline
        .refresh_watch(&state.watch.topic, &state.watch.label_ids)
        .await?;

    Ok(Json(WatchResponse {
        history_id: status.history_id,
        expires_at: status.expiration.and_then(DateTime::from_timestamp_millis),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::ScriptedClassifier;
    use crate::mailbox::testing::{message, FakeMailbox};
    use crate::pacing::testing::RecordingPacer;
    use crate::services::PipelineSettings;
    use crate::sheets::testing::MemoryStore;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use tower::ServiceExt;

    const ACME_VERDICT: &str =
        "Classification: Application Response\nCompany: Acme\nRole: SWE\nDate Applied: 2024-01-05";

    fn app(mailbox: FakeMailbox, classifier: ScriptedClassifier, store: Arc<MemoryStore>) -> Router {
        let pipeline = Pipeline::new(
            Arc::new(mailbox),
            Arc::new(classifier),
            store,
            Arc::new(RecordingPacer::default()),
            PipelineSettings::default(),
        );

        router(AppState::new(
            Arc::new(pipeline),
            WatchTarget {
                topic: "projects/tracker/topics/gmail".to_string(),
                label_ids: vec!["INBOX".to_string()],
            },
        ))
    }

    fn inbox() -> FakeMailbox {
        FakeMailbox::default()
            .with_message(message(
                "m1",
                "careers@acme.com",
                "Your application update",
                "Thanks for applying",
                1_709_307_000_000,
            ))
            .with_history(&["m1"])
    }

    fn push_body(history_id: u64) -> Body {
        let data = STANDARD.encode(format!(
            r#"{{"emailAddress":"tracker@example.com","historyId":{}}}"#,
            history_id
        ));
        Body::from(
            serde_json::json!({
                "message": { "data": data, "messageId": "1" },
                "subscription": "projects/tracker/subscriptions/gmail-push"
            })
            .to_string(),
        )
    }

    async fn send(app: Router, method: Method, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_webhook_appends_application() {
        let store = Arc::new(MemoryStore::default());
        let app = app(inbox(), ScriptedClassifier::always(ACME_VERDICT), store.clone());

        let (status, _) = send(app, Method::POST, "/message", push_body(100)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.rows().len(), 1);
        assert_eq!(store.rows()[0].company, "Acme");
    }

    #[tokio::test]
    async fn test_webhook_classifier_failure_is_no_content() {
        let store = Arc::new(MemoryStore::default());
        let app = app(
            inbox(),
            ScriptedClassifier::sequence(vec![Err("upstream 500")]),
            store.clone(),
        );

        let (status, _) = send(app, Method::POST, "/message", push_body(100)).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_store_failure_is_server_error() {
        let store = Arc::new(MemoryStore {
            fail_appends: true,
            ..Default::default()
        });
        let app = app(inbox(), ScriptedClassifier::always(ACME_VERDICT), store);

        let (status, body) = send(app, Method::POST, "/message", push_body(100)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("m1"));
    }

    #[tokio::test]
    async fn test_webhook_history_failure_is_server_error() {
        let app = app(
            FakeMailbox::default().with_failing_history(),
            ScriptedClassifier::always(ACME_VERDICT),
            Arc::new(MemoryStore::default()),
        );

        let (status, _) = send(app, Method::POST, "/message", push_body(100)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_bodies() {
        let make = || {
            app(
                inbox(),
                ScriptedClassifier::always(ACME_VERDICT),
                Arc::new(MemoryStore::default()),
            )
        };

        let (status, body) = send(make(), Method::POST, "/message", Body::from("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid JSON format");

        let bad_data = serde_json::json!({ "message": { "data": "%%%" } }).to_string();
        let (status, _) = send(make(), Method::POST, "/message", Body::from(bad_data)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let not_a_notification = serde_json::json!({
            "message": { "data": STANDARD.encode("[1, 2, 3]") }
        })
        .to_string();
        let (status, _) =
            send(make(), Method::POST, "/message", Body::from(not_a_notification)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_watch() {
        let (status, body) = send(
            app(
                FakeMailbox::default(),
                ScriptedClassifier::always(ACME_VERDICT),
                Arc::new(MemoryStore::default()),
            ),
            Method::POST,
            "/refresh",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["history_id"], 1234);
        assert_eq!(json["expires_at"], "2024-03-09T16:00:00Z");
    }

    #[tokio::test]
    async fn test_refresh_rejects_other_methods() {
        let (status, _) = send(
            app(
                FakeMailbox::default(),
                ScriptedClassifier::always(ACME_VERDICT),
                Arc::new(MemoryStore::default()),
            ),
            Method::GET,
            "/refresh",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_refresh_upstream_failure() {
        let (status, _) = send(
            app(
                FakeMailbox::default().with_failing_watch(),
                ScriptedClassifier::always(ACME_VERDICT),
                Arc::new(MemoryStore::default()),
            ),
            Method::POST,
            "/refresh",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _) = send(
            app(
                FakeMailbox::default(),
                ScriptedClassifier::always(ACME_VERDICT),
                Arc::new(MemoryStore::default()),
            ),
            Method::GET,
            "/health",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
    }
}
