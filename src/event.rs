use serde_json::{Map, Value};
use std::fmt;

pub const CALL_INITIATED: &str = "call.initiated";
pub const CALL_GATHER_ENDED: &str = "call.gather.ended";
pub const CALL_HANGUP: &str = "call.hangup";

/// EventKind classifies the `data.event_type` of a call-control webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Inbound call is ringing
    Initiated,
    /// Digit collection finished
    GatherEnded,
    /// Call leg is gone
    Hangup,
    /// Any other event type, echoed back to the sender
    Other(String),
    /// No event type in the body
    Missing,
}

impl EventKind {
    pub fn parse(event_type: Option<&str>) -> Self {
        match event_type {
            Some(CALL_INITIATED) => EventKind::Initiated,
            Some(CALL_GATHER_ENDED) => EventKind::GatherEnded,
            Some(CALL_HANGUP) => EventKind::Hangup,
            Some(other) => EventKind::Other(other.to_string()),
            None => EventKind::Missing,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EventKind::Initiated => Some(CALL_INITIATED),
            EventKind::GatherEnded => Some(CALL_GATHER_ENDED),
            EventKind::Hangup => Some(CALL_HANGUP),
            EventKind::Other(other) => Some(other.as_str()),
            EventKind::Missing => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("-"))
    }
}

/// A decoded webhook body: `{ data: { event_type, payload: {...} } }`.
///
/// Decoding never fails. Anything that is not the expected shape becomes an
/// event with no type and an empty payload.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: EventKind,
    pub payload: Map<String, Value>,
}

impl WebhookEvent {
    pub fn new(kind: EventKind, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    pub fn from_slice(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::new(EventKind::Missing, Map::new()),
        }
    }

    pub fn from_value(body: &Value) -> Self {
        let data = body.get("data").and_then(Value::as_object);
        let event_type = data
            .and_then(|data| data.get("event_type"))
            .and_then(Value::as_str);
        let payload = data
            .and_then(|data| data.get("payload"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self::new(EventKind::parse(event_type), payload)
    }

    /// Non-empty `call_control_id` string of the payload.
    pub fn call_control_id(&self) -> Option<&str> {
        self.payload
            .get("call_control_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn digits(&self) -> String {
        extract_digits(&self.payload)
    }
}

/// Pulls the pressed key(s) out of a gather payload.
///
/// Lookup order: `digit`, `digits`, then inside the first present of
/// `result` / `dtmf`: `digits`, `digit`. The first present value is
/// stringified and trimmed. Absent means missing, null, "", false, 0 or an
/// empty array/object.
pub fn extract_digits(payload: &Map<String, Value>) -> String {
    if let Some(value) = first_present(payload, &["digit", "digits"]) {
        return value_to_string(value).trim().to_string();
    }
    match first_present(payload, &["result", "dtmf"]) {
        Some(Value::Object(nested)) => first_present(nested, &["digits", "digit"])
            .map(|value| value_to_string(value).trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| is_present(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

// Non-string values use their JSON text: `true` renders as "true", `[1]` as
// "[1]". None of these map to a department.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
