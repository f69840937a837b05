use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod telnyx;
pub use telnyx::TelnyxControl;


/// Why a control command did not take effect.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform rejected command: {status} {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for CommandError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CommandError::Timeout
        } else {
            CommandError::Transport(e.to_string())
        }
    }
}

pub type CommandResult = std::result::Result<(), CommandError>;

/// Outbound call-control actions against the telephony platform.
///
/// Every call sends exactly one request and never retries. `Ok` means the
/// platform accepted the command; every other outcome is a `CommandError`
/// that has already been logged by the implementation.
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn answer(&self, call_control_id: &str) -> CommandResult;

    async fn transfer(&self, call_control_id: &str, destination: &str) -> CommandResult;

    /// Plays the department menu and starts collecting one key.
    async fn start_menu(&self, call_control_id: &str) -> CommandResult;
}

pub type CallControlRef = Arc<dyn CallControl>;
