//! AgentPact wire protocol
//!
//! Events are carried as compact JSON inside a ledger memo. The encoder
//! always emits `protocol, version, action` first, followed by the variant
//! fields in declaration order. The decoder tolerates unknown fields but
//! requires every field of the matched variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol marker carried by every event
pub const PROTOCOL: &str = "AgentPact";

/// Wire version carried by every event
pub const VERSION: &str = "1.0";

/// A task handed from one agent to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEvent {
    pub from: String,
    pub to: String,
    pub task: String,
    /// Creation wall-clock time in milliseconds. Advisory only.
    pub timestamp: i64,
}

/// A task reported done by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub agent: String,
    pub task: String,
    pub result: String,
    /// Creation wall-clock time in milliseconds. Advisory only.
    pub timestamp: i64,
}

/// A coordination event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PactEvent {
    Handoff(HandoffEvent),
    Completion(CompletionEvent),
}

/// Discriminator values on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Handoff,
    Completion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Handoff => "handoff",
            EventKind::Completion => "completion",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "handoff" => Some(EventKind::Handoff),
            "completion" => Some(EventKind::Completion),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a payload was not accepted as an AgentPact event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotRecognized {
    /// Not UTF-8, not JSON, or not a JSON object
    Malformed,
    MissingProtocol,
    ForeignProtocol(String),
    VersionMismatch(String),
    /// `action`/`kind` absent or not a known variant
    UnknownAction(String),
    /// Variant fields missing or mistyped
    MissingFields(String),
}

impl std::fmt::Display for NotRecognized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotRecognized::Malformed => write!(f, "not structured data"),
            NotRecognized::MissingProtocol => write!(f, "no protocol field"),
            NotRecognized::ForeignProtocol(p) => write!(f, "foreign protocol '{}'", p),
            NotRecognized::VersionMismatch(v) => write!(f, "unsupported version '{}'", v),
            NotRecognized::UnknownAction(a) => write!(f, "unknown action '{}'", a),
            NotRecognized::MissingFields(e) => write!(f, "incomplete event: {}", e),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    protocol: &'static str,
    version: &'static str,
    action: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl PactEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PactEvent::Handoff(_) => EventKind::Handoff,
            PactEvent::Completion(_) => EventKind::Completion,
        }
    }

    pub fn task(&self) -> &str {
        match self {
            PactEvent::Handoff(h) => &h.task,
            PactEvent::Completion(c) => &c.task,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            PactEvent::Handoff(h) => h.timestamp,
            PactEvent::Completion(c) => c.timestamp,
        }
    }

    /// Serialize to the canonical wire text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let action = self.kind().as_str();
        match self {
            PactEvent::Handoff(body) => serde_json::to_string(&Envelope {
                protocol: PROTOCOL,
                version: VERSION,
                action,
                body,
            }),
            PactEvent::Completion(body) => serde_json::to_string(&Envelope {
                protocol: PROTOCOL,
                version: VERSION,
                action,
                body,
            }),
        }
    }

    /// Decode raw memo bytes
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, NotRecognized> {
        let text = std::str::from_utf8(bytes).map_err(|_| NotRecognized::Malformed)?;
        Self::decode(text)
    }

    /// Decode memo text. Never panics; anything that is not a well-formed
    /// AgentPact event comes back as [`NotRecognized`].
    pub fn decode(text: &str) -> Result<Self, NotRecognized> {
        let value: Value = serde_json::from_str(text).map_err(|_| NotRecognized::Malformed)?;
        let Value::Object(map) = value else {
            return Err(NotRecognized::Malformed);
        };

        match map.get("protocol") {
            None => return Err(NotRecognized::MissingProtocol),
            Some(Value::String(p)) if p == PROTOCOL => {}
            Some(other) => return Err(NotRecognized::ForeignProtocol(display_value(other))),
        }

        match map.get("version") {
            Some(Value::String(v)) if v == VERSION => {}
            Some(other) => return Err(NotRecognized::VersionMismatch(display_value(other))),
            None => return Err(NotRecognized::VersionMismatch(String::new())),
        }

        let action = ["action", "kind"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .unwrap_or_default();
        let kind = EventKind::parse(action)
            .ok_or_else(|| NotRecognized::UnknownAction(action.to_string()))?;

        match kind {
            EventKind::Handoff => decode_body(map).map(PactEvent::Handoff),
            EventKind::Completion => decode_body(map).map(PactEvent::Completion),
        }
    }
}

fn decode_body<T: for<'de> Deserialize<'de>>(map: Map<String, Value>) -> Result<T, NotRecognized> {
    serde_json::from_value(Value::Object(map)).map_err(|e| NotRecognized::MissingFields(e.to_string()))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Create a handoff event stamped with the current time, without publishing
pub fn create_handoff_log(from: &str, to: &str, task: &str) -> HandoffEvent {
    HandoffEvent {
        from: from.to_string(),
        to: to.to_string(),
        task: task.to_string(),
        timestamp: now_millis(),
    }
}

/// Create a completion event stamped with the current time, without publishing
pub fn create_completion_log(agent: &str, task: &str, result: &str) -> CompletionEvent {
    CompletionEvent {
        agent: agent.to_string(),
        task: task.to_string(),
        result: result.to_string(),
        timestamp: now_millis(),
    }
}

impl From<HandoffEvent> for PactEvent {
    fn from(event: HandoffEvent) -> Self {
        PactEvent::Handoff(event)
    }
}

impl From<CompletionEvent> for PactEvent {
    fn from(event: CompletionEvent) -> Self {
        PactEvent::Completion(event)
    }
}
