//! Webhook server for Facebook Messenger
//!
//! Routes:
//! - `GET  <webhook_path>`  handshake
//! - `POST <webhook_path>`  deliveries, always answered with 200
//! - `POST <send_api_path>` push-style send (only when configured)
//! - `GET  /health`

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use mg_core::HEALTH_PATH;

use crate::handler::MessengerHandler;
use crate::signature::SIGNATURE_HEADER;

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub handler: Arc<MessengerHandler>,
}

/// Handshake query parameters
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Create webhook router
pub fn create_webhook_router(state: WebhookState) -> Router {
    let config = state.handler.config();

    let mut router = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(&config.webhook_path, get(verify_webhook).post(receive_webhook));

    if let Some(send_api_path) = &config.send_api_path {
        router = router.route(send_api_path, post(push_send));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health() -> &'static str {
    "OK"
}

/// Answer the subscription handshake.
///
/// Succeeds only for `hub.mode=subscribe` with the configured validation
/// token, echoing `hub.challenge`.
async fn verify_webhook(
    State(state): State<Arc<WebhookState>>,
    params: Result<Query<VerifyParams>, QueryRejection>,
) -> Response {
    let params = params.map(|Query(p)| p).unwrap_or_default();
    let config = state.handler.config();

    let subscribed = params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(config.validation_token.as_str());

    if !subscribed {
        warn!("Failed validation. Make sure the validation tokens match.");
        return StatusCode::FORBIDDEN.into_response();
    }

    info!("Validating webhook");
    (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
}

/// Receive a delivery.
///
/// Always 200. Facebook retries anything else.
async fn receive_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read webhook body: {}", e);
            return StatusCode::OK;
        }
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let report = state.handler.process_signed_webhook(signature, &body).await;

    debug!(
        "Webhook processed: rejection={:?}, events={}, sends={}",
        report.rejection,
        report.outcomes.len(),
        report.pending_sends()
    );

    StatusCode::OK
}

/// Push a message on behalf of the host bot
async fn push_send(
    State(state): State<Arc<WebhookState>>,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read send request body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    match state.handler.push_send(&body) {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!("Rejected send request: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}
