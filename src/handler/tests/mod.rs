mod dispatcher_test;

use crate::control::{CallControl, CommandError, CommandResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{sync::Mutex, time::Duration};

/// Control fake that records every command and answers from fixed flags.
pub(super) struct RecordingControl {
    pub answer_ok: bool,
    pub transfer_ok: bool,
    pub menu_ok: bool,
    pub transfer_delay: Duration,
    pub commands: Mutex<Vec<String>>,
}

impl Default for RecordingControl {
    fn default() -> Self {
        Self {
            answer_ok: true,
            transfer_ok: true,
            menu_ok: true,
            transfer_delay: Duration::ZERO,
            commands: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingControl {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }

    fn record(&self, command: String, ok: bool) -> CommandResult {
        self.commands.lock().unwrap().push(command);
        if ok {
            Ok(())
        } else {
            Err(CommandError::Rejected {
                status: 422,
                body: "rejected by test".to_string(),
            })
        }
    }
}

#[async_trait]
impl CallControl for RecordingControl {
    async fn answer(&self, call_control_id: &str) -> CommandResult {
        self.record(format!("answer:{}", call_control_id), self.answer_ok)
    }

    async fn transfer(&self, call_control_id: &str, destination: &str) -> CommandResult {
        if !self.transfer_delay.is_zero() {
            tokio::time::sleep(self.transfer_delay).await;
        }
        self.record(
            format!("transfer:{}:{}", call_control_id, destination),
            self.transfer_ok,
        )
    }

    async fn start_menu(&self, call_control_id: &str) -> CommandResult {
        self.record(format!("menu:{}", call_control_id), self.menu_ok)
    }
}

pub(super) fn webhook_body(event_type: &str, payload: Value) -> Value {
    json!({
        "data": {
            "event_type": event_type,
            "payload": payload,
        }
    })
}
