//! Webhook gateway - verification and the HTTP surface.
//!
//! The platform delivers callbacks as `POST /` with a JSON body. The
//! gateway verifies each request and answers synchronously:
//!
//! 1. A confirmation challenge for the configured group gets the literal
//!    confirmation token back and is never dispatched.
//! 2. A payload carrying the correct shared secret is acknowledged with
//!    `"ok"` and then handed to the [`Dispatcher`] on a spawned task. The
//!    acknowledgement always completes before dispatch begins; the
//!    platform treats the webhook as fire-and-forget.
//! 3. Anything else is a 400 and is dropped.
//!
//! `GET /` is a reachability probe and always answers 400.

use crate::config::BotConfig;
use crate::dispatch::Dispatcher;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Shared state for the HTTP handlers. Both fields are immutable after
/// startup; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BotConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Outcome of verifying one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAction {
    /// Valid confirmation challenge: answer with the confirmation token
    Confirm,
    /// Secret verified: acknowledge and dispatch
    Accept,
    /// Verification failed: 400, no dispatch
    Reject,
}

/// Verify an inbound payload against the configured group identity and
/// shared secret.
pub fn classify(body: &Value, config: &BotConfig) -> GatewayAction {
    let is_confirmation = body.get("type").and_then(Value::as_str) == Some("confirmation");
    if is_confirmation && group_id_matches(body.get("group_id"), config.group_id) {
        return GatewayAction::Confirm;
    }

    if body.get("secret").and_then(Value::as_str) == Some(config.secret.as_str()) {
        return GatewayAction::Accept;
    }

    GatewayAction::Reject
}

/// Compare the payload's declared group id against the configured one.
/// The platform sends it as a number, but a string form is tolerated.
fn group_id_matches(declared: Option<&Value>, configured: i64) -> bool {
    match declared {
        Some(Value::Number(n)) => n.as_i64() == Some(configured),
        Some(Value::String(s)) => s.parse::<i64>() == Ok(configured),
        _ => false,
    }
}

/// Build the HTTP application.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(probe).post(webhook))
        .with_state(state)
}

/// Reachability probe. The webhook endpoint only speaks POST.
async fn probe() -> (StatusCode, &'static str) {
    info!("GET request on webhook endpoint");
    (StatusCode::BAD_REQUEST, "Only POST allowed.")
}

async fn webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    match classify(&body, &state.config) {
        GatewayAction::Confirm => {
            info!("Confirmation challenge, answering with token");
            (StatusCode::OK, state.config.confirmation_token.clone())
        }
        GatewayAction::Accept => {
            // Acknowledge first; dispatch runs on its own task after the
            // response is produced.
            let dispatcher = state.dispatcher.clone();
            let correlation_id = uuid::Uuid::new_v4().to_string();
            let span = info_span!("dispatch", correlation_id = %correlation_id);

            tokio::spawn(
                async move {
                    dispatcher.dispatch(&body).await;
                }
                .instrument(span),
            );

            (StatusCode::OK, "ok".to_string())
        }
        GatewayAction::Reject => {
            warn!("Request with an invalid secret key");
            (StatusCode::BAD_REQUEST, "Invalid secret key.".to_string())
        }
    }
}
