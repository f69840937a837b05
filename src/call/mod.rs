use serde::Serialize;
use std::fmt;

pub mod ivr;
pub mod registry;

pub use ivr::{Department, DepartmentTable, MenuPrompt};
pub use registry::{CallRegistry, CallRegistryRef, CallSnapshot, GatherClaim};

/// Routing state of a single call leg, derived from what the registry has
/// observed for its call-control-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Nothing recorded yet.
    Unseen,
    /// Answered, waiting for the caller to pick a department.
    MenuActive,
    /// Transfer accepted by the platform.
    Routed,
    /// Hangup observed. Wins over `Routed`.
    Ended,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Unseen => "unseen",
            CallState::MenuActive => "menu_active",
            CallState::Routed => "routed",
            CallState::Ended => "ended",
        }
    }

    /// Whether a `call.gather.ended` event may still act on this call.
    pub fn accepts_gather(&self) -> bool {
        matches!(self, CallState::Unseen | CallState::MenuActive)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
