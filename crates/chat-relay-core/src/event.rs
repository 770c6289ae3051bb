//! Outbound events and their text event-stream framing.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Event name used when a reply event does not carry one.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Event name emitted once when a stream is opened.
pub const READY_EVENT_NAME: &str = "ready";

/// A named event pushed onto a session's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Event name, written on the `event:` line.
    pub name: String,
    /// Payload, serialized as JSON on the `data:` line.
    pub payload: Value,
}

impl OutboundEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The greeting sent right after a stream is registered.
    #[must_use]
    pub fn ready(client_id: &str) -> Self {
        Self::new(
            READY_EVENT_NAME,
            json!({
                "message": "SSE connection established",
                "clientId": client_id,
            }),
        )
    }

    /// Build an event from one element of a reply's `events` array.
    ///
    /// A missing, null, empty or non-string `name` falls back to
    /// [`DEFAULT_EVENT_NAME`], as does a name containing a line break, which
    /// would otherwise split the frame. A missing `payload` falls back to the whole
    /// element; a `payload` that is present is kept even when it is null.
    #[must_use]
    pub fn from_reply_element(element: Value) -> Self {
        let Value::Object(mut fields) = element else {
            return Self::new(DEFAULT_EVENT_NAME, element);
        };

        let name = match fields.get("name") {
            Some(Value::String(name)) if is_valid_name(name) => name.clone(),
            _ => DEFAULT_EVENT_NAME.to_string(),
        };

        match fields.remove("payload") {
            Some(payload) => Self::new(name, payload),
            None => Self::new(name, Value::Object(fields)),
        }
    }

    /// Frame the event for a `text/event-stream` body.
    ///
    /// The result is an `event:` line, a `data:` line and a blank line.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let data = serde_json::to_string(&self.payload)?;
        Ok(format!("event: {}\ndata: {data}\n\n", self.name))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['\n', '\r'])
}
