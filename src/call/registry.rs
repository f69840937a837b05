use super::CallState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

pub type CallRegistryRef = Arc<CallRegistry>;

#[derive(Debug, Clone)]
struct CallEntry {
    answered: bool,
    routed: bool,
    ended: bool,
    gather_in_flight: bool,
    first_seen: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CallEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            answered: false,
            routed: false,
            ended: false,
            gather_in_flight: false,
            first_seen: now,
            updated_at: now,
        }
    }

    fn state(&self) -> CallState {
        if self.ended {
            CallState::Ended
        } else if self.routed {
            CallState::Routed
        } else if self.answered || self.gather_in_flight {
            CallState::MenuActive
        } else {
            CallState::Unseen
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub call_control_id: String,
    pub state: CallState,
    pub routed: bool,
    pub ended: bool,
    pub first_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide record of which calls were routed and which have hung up.
///
/// Entries are created on the first event that needs one and are never
/// removed; the registry lives as long as the process. Routed and ended are
/// independent flags, so a call can be both.
#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: Mutex<HashMap<String, CallEntry>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave an entry half-written, every
    // update is a single field store.
    fn calls(&self) -> MutexGuard<'_, HashMap<String, CallEntry>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, call_control_id: &str) -> CallState {
        self.calls()
            .get(call_control_id)
            .map(|entry| entry.state())
            .unwrap_or(CallState::Unseen)
    }

    pub fn is_routed(&self, call_control_id: &str) -> bool {
        self.calls()
            .get(call_control_id)
            .map(|entry| entry.routed)
            .unwrap_or(false)
    }

    pub fn is_ended(&self, call_control_id: &str) -> bool {
        self.calls()
            .get(call_control_id)
            .map(|entry| entry.ended)
            .unwrap_or(false)
    }

    /// Records that the call was answered and the menu is (being) played.
    pub fn mark_menu_active(&self, call_control_id: &str) {
        let mut calls = self.calls();
        let entry = calls
            .entry(call_control_id.to_string())
            .or_insert_with(CallEntry::new);
        entry.answered = true;
        entry.touch();
    }

    /// Adds the call to the routed set. Returns `false` if it was already there.
    pub fn mark_routed(&self, call_control_id: &str) -> bool {
        let mut calls = self.calls();
        let entry = calls
            .entry(call_control_id.to_string())
            .or_insert_with(CallEntry::new);
        let newly_routed = !entry.routed;
        entry.routed = true;
        entry.touch();
        newly_routed
    }

    /// Adds the call to the ended set, whatever its previous state.
    pub fn mark_ended(&self, call_control_id: &str) -> bool {
        let mut calls = self.calls();
        let entry = calls
            .entry(call_control_id.to_string())
            .or_insert_with(CallEntry::new);
        let newly_ended = !entry.ended;
        entry.ended = true;
        entry.touch();
        newly_ended
    }

    /// Reserves the right to act on a gathered digit for this call.
    ///
    /// Returns `None` if the call is routed, ended, or another gather event
    /// for it is still being processed. The check and the reservation happen
    /// under one lock, so two concurrent events cannot both pass.
    pub fn claim_gather(self: &Arc<Self>, call_control_id: &str) -> Option<GatherClaim> {
        let mut calls = self.calls();
        let entry = calls
            .entry(call_control_id.to_string())
            .or_insert_with(CallEntry::new);
        if entry.gather_in_flight || !entry.state().accepts_gather() {
            debug!(
                call_control_id,
                routed = entry.routed,
                ended = entry.ended,
                in_flight = entry.gather_in_flight,
                "gather claim refused"
            );
            return None;
        }
        entry.gather_in_flight = true;
        entry.touch();
        Some(GatherClaim {
            registry: self.clone(),
            call_control_id: call_control_id.to_string(),
        })
    }

    fn release_gather(&self, call_control_id: &str) {
        if let Some(entry) = self.calls().get_mut(call_control_id) {
            entry.gather_in_flight = false;
        }
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }

    pub fn snapshot(&self) -> Vec<CallSnapshot> {
        let mut list = self
            .calls()
            .iter()
            .map(|(id, entry)| CallSnapshot {
                call_control_id: id.clone(),
                state: entry.state(),
                routed: entry.routed,
                ended: entry.ended,
                first_seen: entry.first_seen,
                updated_at: entry.updated_at,
            })
            .collect::<Vec<_>>();
        list.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        list
    }
}

/// Exclusive right to process one gathered digit for a call. Dropping it
/// lets the next gather event for the same call through.
#[derive(Debug)]
pub struct GatherClaim {
    registry: CallRegistryRef,
    call_control_id: String,
}

impl GatherClaim {
    pub fn call_control_id(&self) -> &str {
        &self.call_control_id
    }

    /// Moves the call to the routed set. The claim is consumed; the call will
    /// not accept further gather events.
    pub fn complete_routed(self) -> bool {
        self.registry.mark_routed(&self.call_control_id)
    }
}

impl Drop for GatherClaim {
    fn drop(&mut self) {
        self.registry.release_gather(&self.call_control_id);
    }
}
