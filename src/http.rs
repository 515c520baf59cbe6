//! Operator-facing HTTP triggers and the Telegram webhook.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};

use crate::bot::Orchestrator;
use crate::channels::decode_update;
use crate::dispatch::{BroadcastRequest, DispatchEngine};
use crate::error::DispatchError;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchEngine>,
    /// Set when updates arrive by webhook rather than long polling.
    pub orchestrator: Option<Arc<Orchestrator>>,
}

/// Build the router. The webhook route exists only in webhook mode.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/broadcast", post(broadcast))
        .route("/api/scheduled-bio", get(scheduled_bio).post(scheduled_bio));

    if state.orchestrator.is_some() {
        router = router.route("/telegram/webhook", post(webhook));
    }

    router.layer(cors).with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "leadbot"
    }))
}

// ── Dispatch ────────────────────────────────────────────────────────────

async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> impl IntoResponse {
    match state.dispatch.broadcast(&request).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "total": report.total,
                "sent": report.sent,
                "failed": report.failed,
            })),
        ),
        Err(DispatchError::InvalidRequest(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": reason})),
        ),
        Err(e) => {
            tracing::error!("Broadcast failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

async fn scheduled_bio(State(state): State<AppState>) -> impl IntoResponse {
    match state.dispatch.run_bio_batch(Utc::now()).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": format!("Bio check complete. Sent to {} users.", report.sent),
                "total": report.total,
                "sent": report.sent,
                "failed": report.failed,
                "retired": report.retired,
            })),
        ),
        Err(e) => {
            tracing::error!("Scheduled bio failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

// ── Webhook ─────────────────────────────────────────────────────────────

/// Handle one Telegram update inline. A non-2xx answer makes Telegram
/// redeliver the update later.
async fn webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let Some(orchestrator) = state.orchestrator else {
        return StatusCode::NOT_FOUND;
    };

    let update: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::error!("Webhook body is not JSON: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let event = match decode_update(&update) {
        Ok(Some(event)) => event,
        Ok(None) => return StatusCode::OK,
        Err(e) => {
            tracing::error!("Failed to decode webhook update: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match orchestrator.handle(event).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("Webhook event failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use crate::auth::OperatorAllowList;
    use crate::bot::BotDeps;
    use crate::channels::{ChatPlatform, Keyboard, MediaKind, MediaSource};
    use crate::config::{BotConfig, DispatchConfig};
    use crate::contacts::ContactProfile;
    use crate::error::{ChannelError, LlmError};
    use crate::llm::LlmProvider;
    use crate::store::{Database, LibSqlBackend};

    #[derive(Default)]
    struct Outbox {
        texts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatPlatform for Outbox {
        async fn send_text(
            &self,
            chat_id: &str,
            text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> Result<i64, ChannelError> {
            let mut texts = self.texts.lock().await;
            texts.push((chat_id.to_string(), text.to_string()));
            Ok(texts.len() as i64)
        }

        async fn send_media(
            &self,
            _chat_id: &str,
            _kind: MediaKind,
            _source: &MediaSource,
            _caption: Option<&str>,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn edit_message_controls(
            &self,
            _chat_id: &str,
            _message_id: i64,
            _keyboard: Option<&Keyboard>,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn set_menu_button(&self, _: &str, _: &str, _: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn answer_callback(&self, _: &str, _: Option<&str>) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("echo".into())
        }
    }

    async fn setup(webhook: bool) -> (Router, Arc<LibSqlBackend>, Arc<Outbox>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let outbox = Arc::new(Outbox::default());
        let config = DispatchConfig {
            send_delay: std::time::Duration::ZERO,
            ..DispatchConfig::default()
        };
        let dispatch = Arc::new(DispatchEngine::new(db.clone(), outbox.clone(), config));
        let orchestrator = webhook.then(|| {
            Arc::new(Orchestrator::new(
                BotDeps {
                    db: db.clone(),
                    llm: Arc::new(EchoLlm),
                    platform: outbox.clone(),
                    authorizer: Arc::new(OperatorAllowList::default()),
                },
                BotConfig::default(),
            ))
        });
        let router = routes(AppState {
            dispatch,
            orchestrator,
        });
        (router, db, outbox)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (router, _, _) = setup(false).await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn broadcast_reports_counts() {
        let (router, db, outbox) = setup(false).await;
        for id in ["1", "2", "3"] {
            db.upsert_contact(&ContactProfile::new(id), Utc::now()).await.unwrap();
        }

        let response = router
            .oneshot(post_json(
                "/api/broadcast",
                serde_json::json!({"segment": "all", "message": "News"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["sent"], 3);
        assert_eq!(body["failed"], 0);
        assert_eq!(outbox.texts.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn invalid_broadcast_is_bad_request() {
        let (router, _, outbox) = setup(false).await;
        let response = router
            .oneshot(post_json(
                "/api/broadcast",
                serde_json::json!({"segment": "magnet", "message": "Hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
        assert!(outbox.texts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn scheduled_bio_accepts_get() {
        let (router, _, _) = setup(false).await;
        let response = router
            .oneshot(Request::get("/api/scheduled-bio").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["sent"], 0);
    }

    #[tokio::test]
    async fn webhook_only_in_webhook_mode() {
        let (router, _, _) = setup(false).await;
        let response = router
            .oneshot(post_json("/telegram/webhook", serde_json::json!({"update_id": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_handles_message() {
        let (router, db, outbox) = setup(true).await;
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "first_name": "Ann"},
                "chat": {"id": 42},
                "text": "hello"
            }
        });

        let response = router.oneshot(post_json("/telegram/webhook", update)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(db.get_contact("42").await.unwrap().is_some());
        assert_eq!(
            *outbox.texts.lock().await,
            vec![("42".to_string(), "echo".to_string())]
        );
    }

    #[tokio::test]
    async fn undecodable_webhook_is_server_error() {
        let (router, _, _) = setup(true).await;
        let response = router
            .oneshot(
                Request::post("/telegram/webhook")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
