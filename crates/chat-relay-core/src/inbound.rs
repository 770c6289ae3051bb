//! Inbound client submissions.

use serde_json::{Map, Value};

/// Places a session identifier may arrive from, in precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdSources {
    /// Transport-level session header.
    pub header: Option<String>,
    /// `client_id` query parameter.
    pub query: Option<String>,
    /// Identifier embedded in the request body.
    pub body: Option<String>,
}

impl SessionIdSources {
    /// Resolve the session identifier: header, then query, then body.
    ///
    /// Values are trimmed; the first non-empty one wins.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        [&self.header, &self.query, &self.body]
            .into_iter()
            .find_map(|source| normalise(source.as_deref()))
    }
}

/// Trim a candidate identifier, discarding empty values.
#[must_use]
pub fn normalise(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A message submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Candidate session identifiers.
    pub session: SessionIdSources,
    /// Arbitrary payload to forward to the backend.
    pub message: Value,
}

impl InboundMessage {
    /// Create a message with explicit sources.
    #[must_use]
    pub const fn new(session: SessionIdSources, message: Value) -> Self {
        Self { session, message }
    }

    /// Split a request body into the message and a body-embedded identifier.
    ///
    /// - A non-object body is the message as a whole.
    /// - `{"message": ..., "client_id"|"clientId": ...}` yields the `message` value.
    /// - An object carrying only `client_id`/`clientId` besides other keys has
    ///   those keys stripped and the rest forwarded.
    /// - Any other object is forwarded unchanged.
    #[must_use]
    pub fn from_body(body: Value) -> Self {
        let Value::Object(mut fields) = body else {
            return Self::new(SessionIdSources::default(), body);
        };

        let (body_id, message) = if fields.contains_key("message") {
            let id = embedded_id(&fields);
            (id, fields.remove("message").unwrap_or(Value::Null))
        } else if fields.contains_key("client_id") || fields.contains_key("clientId") {
            let id = embedded_id(&fields);
            fields.remove("client_id");
            fields.remove("clientId");
            (id, Value::Object(fields))
        } else {
            (None, Value::Object(fields))
        };

        Self::new(
            SessionIdSources {
                body: body_id,
                ..SessionIdSources::default()
            },
            message,
        )
    }

    /// Whether the payload is a structured value (object or array).
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self.message, Value::Object(_) | Value::Array(_))
    }
}

fn embedded_id(fields: &Map<String, Value>) -> Option<String> {
    ["client_id", "clientId"]
        .into_iter()
        .find_map(|key| normalise(fields.get(key).and_then(Value::as_str)))
}
