use crate::{
    call::{CallRegistryRef, DepartmentTable},
    control::CallControlRef,
    event::{EventKind, WebhookEvent},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result reported back to the webhook sender. Always delivered with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AnsweredAndMenuStarted,
    AnswerFailed,
    MissingCallControlId,
    GatherProcessed { digit: String },
    GatherIgnored,
    Received,
    /// Event type without a handler; the type is echoed back.
    Unhandled { event: Option<String> },
    Error,
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::AnsweredAndMenuStarted => "answered_and_menu_started",
            Outcome::AnswerFailed => "answer_failed",
            Outcome::MissingCallControlId => "missing_call_control_id",
            Outcome::GatherProcessed { .. } => "gather_processed",
            Outcome::GatherIgnored => "gather_ignored",
            Outcome::Received | Outcome::Unhandled { .. } => "received",
            Outcome::Error => "error",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Outcome::GatherProcessed { digit } => json!({
                "status": self.status(),
                "digit": digit,
            }),
            Outcome::Unhandled { event } => json!({
                "status": self.status(),
                "event": event,
            }),
            _ => json!({ "status": self.status() }),
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.to_json())).into_response()
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("department {0} has no destination")]
    MissingDestination(String),

    #[error("dispatch task failed: {0}")]
    Panicked(String),
}

pub type DispatcherRef = Arc<Dispatcher>;

/// Decides what to do with each webhook event.
///
/// State lives in the shared `CallRegistry`; the dispatcher itself is
/// stateless and may run concurrently for the same call. Failed commands are
/// logged and leave the call where it was.
pub struct Dispatcher {
    registry: CallRegistryRef,
    control: CallControlRef,
    departments: Arc<DepartmentTable>,
}

impl Dispatcher {
    pub fn new(
        registry: CallRegistryRef,
        control: CallControlRef,
        departments: Arc<DepartmentTable>,
    ) -> Self {
        Self {
            registry,
            control,
            departments,
        }
    }

    pub fn registry(&self) -> &CallRegistryRef {
        &self.registry
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Outcome, DispatchError> {
        let outcome = match &event.kind {
            EventKind::Initiated => self.on_initiated(event).await,
            EventKind::GatherEnded => self.on_gather_ended(event).await?,
            EventKind::Hangup => self.on_hangup(event),
            EventKind::Other(event_type) => Outcome::Unhandled {
                event: Some(event_type.clone()),
            },
            EventKind::Missing => Outcome::Unhandled { event: None },
        };
        info!(
            event_type = %event.kind,
            call_control_id = event.call_control_id().unwrap_or("-"),
            status = outcome.status(),
            "webhook handled"
        );
        Ok(outcome)
    }

    async fn on_initiated(&self, event: &WebhookEvent) -> Outcome {
        let Some(call_control_id) = event.call_control_id() else {
            return Outcome::MissingCallControlId;
        };
        if let Err(e) = self.control.answer(call_control_id).await {
            warn!(call_control_id, "answer failed, menu not started: {}", e);
            return Outcome::AnswerFailed;
        }
        self.registry.mark_menu_active(call_control_id);
        if let Err(e) = self.control.start_menu(call_control_id).await {
            warn!(call_control_id, "menu start failed after answer: {}", e);
        }
        Outcome::AnsweredAndMenuStarted
    }

    async fn on_gather_ended(&self, event: &WebhookEvent) -> Result<Outcome, DispatchError> {
        let Some(call_control_id) = event.call_control_id() else {
            return Ok(Outcome::MissingCallControlId);
        };
        let Some(claim) = self.registry.claim_gather(call_control_id) else {
            debug!(call_control_id, "gather after routing or hangup ignored");
            return Ok(Outcome::GatherIgnored);
        };

        let digit = event.digits();
        match self.departments.department_for(&digit) {
            Some(department) => {
                let destination = self
                    .departments
                    .destination(department)
                    .ok_or_else(|| DispatchError::MissingDestination(department.to_string()))?;
                match self.control.transfer(call_control_id, destination).await {
                    Ok(()) => {
                        claim.complete_routed();
                        info!(call_control_id, digit, department, destination, "call routed");
                    }
                    Err(e) => {
                        warn!(call_control_id, digit, department, "transfer failed: {}", e);
                    }
                }
            }
            None => {
                debug!(call_control_id, digit, "unmapped digit, replaying menu");
                if let Err(e) = self.control.start_menu(call_control_id).await {
                    warn!(call_control_id, "menu replay failed: {}", e);
                }
            }
        }
        Ok(Outcome::GatherProcessed { digit })
    }

    fn on_hangup(&self, event: &WebhookEvent) -> Outcome {
        match event.call_control_id() {
            Some(call_control_id) => {
                let state = self.registry.state(call_control_id);
                self.registry.mark_ended(call_control_id);
                debug!(call_control_id, previous = %state, "call ended");
            }
            None => debug!("hangup without call_control_id"),
        }
        Outcome::Received
    }
}
