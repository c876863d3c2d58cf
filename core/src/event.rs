//! Lifecycle events
//!
//! The pipeline emits exactly one request event and, unless the call is
//! cancelled, exactly one terminal event per dispatched descriptor. Reducers
//! match on [`LifecycleEvent::action_type`].

use crate::descriptor::{Method, Resource};
use crate::lifecycle::{ActionType, Phase};
use crate::transport::TransportError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Identifier of one dispatched descriptor, shared by its request and terminal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(u64);

impl DispatchId {
    /// Wrap a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata attached to every lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    /// The dispatch this event belongs to
    pub dispatch_id: DispatchId,
    /// Resource of the originating descriptor
    pub resource: Resource,
    /// Method of the originating descriptor
    pub method: Method,
    /// When the pipeline emitted the event
    pub emitted_at: DateTime<Utc>,
}

/// What a lifecycle event carries
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// The descriptor's payload
    Request(Value),
    /// The transport's result
    Success(Value),
    /// The transport's error, preserved as is
    Failure(TransportError),
}

impl EventPayload {
    /// Phase this payload belongs to
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Request(_) => Phase::Request,
            Self::Success(_) => Phase::Success,
            Self::Failure(_) => Phase::Failure,
        }
    }
}

/// One request/success/failure notification for a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    /// Tag taken from the descriptor's triple
    pub action_type: ActionType,
    /// Payload for this phase
    pub payload: EventPayload,
    /// Dispatch metadata
    pub meta: EventMeta,
}

impl LifecycleEvent {
    /// Assemble an event
    #[must_use]
    pub const fn new(action_type: ActionType, payload: EventPayload, meta: EventMeta) -> Self {
        Self {
            action_type,
            payload,
            meta,
        }
    }

    /// Phase of this event
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.payload.phase()
    }

    /// Whether this event ends its dispatch
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Whether this event carries `tag`
    #[must_use]
    pub fn is(&self, tag: &str) -> bool {
        self.action_type.as_str() == tag
    }

    /// Success value, if this is a success event
    #[must_use]
    pub const fn success(&self) -> Option<&Value> {
        match &self.payload {
            EventPayload::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Transport error, if this is a failure event
    #[must_use]
    pub const fn error(&self) -> Option<&TransportError> {
        match &self.payload {
            EventPayload::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Flat wire view of the event
    ///
    /// Object payloads get the `type` tag merged in; any other payload is nested
    /// under `payload`. Failures carry the error message and its kind.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let tag = Value::String(self.action_type.to_string());
        match &self.payload {
            EventPayload::Request(Value::Object(fields)) | EventPayload::Success(Value::Object(fields)) => {
                let mut merged: Map<String, Value> = fields.clone();
                merged.insert("type".to_string(), tag);
                Value::Object(merged)
            },
            EventPayload::Request(Value::Null) => json!({ "type": tag }),
            EventPayload::Request(other) | EventPayload::Success(other) => {
                json!({ "type": tag, "payload": other })
            },
            EventPayload::Failure(error) => json!({
                "type": tag,
                "error": error.to_string(),
                "kind": error.kind(),
            }),
        }
    }
}
