use super::dispatcher::{DispatchError, Outcome};
use crate::{app::AppState, event::WebhookEvent};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/calls", get(list_calls))
}

/// Receives call-control webhooks. Always answers 200; the outcome is only
/// carried in the JSON body so the sender never retries.
pub async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let event = WebhookEvent::from_slice(&body);
    let dispatcher = state.dispatcher.clone();

    // Run detached: a sender that hangs up mid-request must not cancel a
    // command that may already have reached the platform.
    let result = tokio::spawn(async move { dispatcher.dispatch(&event).await }).await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("webhook error: {}", e);
            Outcome::Error
        }
        Err(e) => {
            error!("webhook error: {}", DispatchError::Panicked(e.to_string()));
            Outcome::Error
        }
    };
    outcome.into_response()
}

async fn list_calls(State(state): State<AppState>) -> Response {
    let calls = serde_json::json!({
        "calls": state.registry.snapshot(),
    });
    Json(calls).into_response()
}
