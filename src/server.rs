//! HTTP server: webhook intake and health probes
//!
//! Three routes: the Meta verification handshake on `GET /webhook`, message
//! intake on `POST /webhook`, and a liveness probe on `GET /health`. Intake
//! returns 200 immediately and processes messages in background tasks; slow
//! webhook responses trigger provider redelivery.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::Orchestrator;
use crate::channels::{MessageDedup, ReplyDelivery, WhatsAppWebhook};
use crate::{Error, Result};

/// Shared state for HTTP handlers
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub delivery: Arc<dyn ReplyDelivery>,
    /// Token echoed by Meta during the verification handshake
    pub verify_token: String,
    pub dedup: Mutex<MessageDedup>,
}

impl AppState {
    /// Create handler state over the given collaborators
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator,
        delivery: Arc<dyn ReplyDelivery>,
        verify_token: String,
    ) -> Self {
        Self {
            orchestrator,
            delivery,
            verify_token,
            dedup: Mutex::new(MessageDedup::default()),
        }
    }
}

/// Webhook acknowledgment body
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Verification handshake query parameters
///
/// Meta sends these as `hub.mode`, `hub.verify_token`, and `hub.challenge`.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Resolve the handshake: the challenge to echo, or `None` to reject
fn verification_reply(expected_token: &str, params: &VerifyParams) -> Option<String> {
    if params.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if params.verify_token.as_deref() != Some(expected_token) {
        return None;
    }
    Some(params.challenge.clone().unwrap_or_default())
}

/// Liveness probe - is the service running?
#[allow(clippy::unused_async)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handle the Meta webhook verification handshake
#[allow(clippy::unused_async)]
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    if let Some(challenge) = verification_reply(&state.verify_token, &params) {
        tracing::info!("webhook verification succeeded");
        (StatusCode::OK, challenge)
    } else {
        tracing::warn!(mode = ?params.mode, "webhook verification rejected");
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// Handle an incoming webhook delivery
///
/// Returns 200 immediately and processes each message in a background task.
#[allow(clippy::unused_async)]
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WhatsAppWebhook>,
) -> (StatusCode, Json<WebhookResponse>) {
    for message in payload.text_messages() {
        {
            let mut dedup = state
                .dedup
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if dedup.is_duplicate(&message.id) {
                tracing::debug!(message_id = %message.id, "duplicate message, skipping");
                continue;
            }
        }

        tracing::debug!(message_id = %message.id, user_id = %message.from, "received message");

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let reply = state
                .orchestrator
                .handle_message(&message.from, &message.text)
                .await;
            if let Err(e) = state.delivery.send(&message.from, &reply).await {
                tracing::error!(user_id = %message.from, error = %e, "reply delivery failed");
            }
        });
    }

    (StatusCode::OK, Json(WebhookResponse { ok: true }))
}

/// Build the router with all routes
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    // CORS layer for dashboard and tooling requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until shutdown
///
/// # Errors
///
/// Returns error if the server fails to bind or run
pub async fn run(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind server: {e}")))?;

    tracing::info!(port, "server listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Config(format!("server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyParams {
        VerifyParams {
            mode: mode.map(String::from),
            verify_token: token.map(String::from),
            challenge: challenge.map(String::from),
        }
    }

    #[test]
    fn test_handshake_echoes_challenge() {
        let reply = verification_reply(
            "secret",
            &params(Some("subscribe"), Some("secret"), Some("1158201444")),
        );
        assert_eq!(reply.as_deref(), Some("1158201444"));
    }

    #[test]
    fn test_handshake_rejects_wrong_token() {
        let reply = verification_reply(
            "secret",
            &params(Some("subscribe"), Some("guess"), Some("1158201444")),
        );
        assert!(reply.is_none());
    }

    #[test]
    fn test_handshake_rejects_missing_mode() {
        let reply = verification_reply("secret", &params(None, Some("secret"), Some("42")));
        assert!(reply.is_none());
    }
}
