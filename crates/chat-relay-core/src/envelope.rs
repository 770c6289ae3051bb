//! Versioned envelopes exchanged with the conversational backend.
//!
//! Requests carry `{version, client: {id}, message}`. Replies arrive as a
//! serialized string holding `{version, client: {id}, events: [...]}` and are
//! validated strictly: any deviation from that shape is rejected rather than
//! coerced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::OutboundEvent;

/// Protocol version attached to every request and required on every reply.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Client reference inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRef {
    pub id: String,
}

/// Envelope sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope<'a> {
    pub version: &'static str,
    pub client: ClientRef,
    pub message: &'a Value,
}

/// Validated reply from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEnvelope {
    /// Protocol version, always [`PROTOCOL_VERSION`].
    pub version: String,
    /// Client the reply is addressed to.
    pub client: ClientRef,
    /// Events in reply order, with name/payload defaults applied.
    pub events: Vec<OutboundEvent>,
}

/// Envelope codec error.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Failed to serialize request envelope: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Backend reply is empty")]
    EmptyReply,
    #[error("Backend reply is not valid JSON: {0}")]
    MalformedReply(String),
    #[error("Unsupported backend protocol version: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnsupportedVersion(Option<String>),
    #[error("Backend reply is missing client.id")]
    MissingClientId,
    #[error("Backend reply is missing events array")]
    MissingEvents,
}

/// Serialize the request envelope for a session.
///
/// # Errors
/// Returns [`EnvelopeError::Serialization`] if the message cannot be serialized.
pub fn encode_request(session_id: &str, message: &Value) -> Result<String, EnvelopeError> {
    let envelope = RequestEnvelope {
        version: PROTOCOL_VERSION,
        client: ClientRef {
            id: session_id.to_string(),
        },
        message,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse and validate a reply envelope.
///
/// Checks run in order: emptiness, JSON shape, version, `client.id`, `events`.
///
/// # Errors
/// Returns the first validation failure encountered.
pub fn decode_reply(raw: &str) -> Result<ReplyEnvelope, EnvelopeError> {
    if raw.trim().is_empty() {
        return Err(EnvelopeError::EmptyReply);
    }

    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| EnvelopeError::MalformedReply(e.to_string()))?;
    let Value::Object(mut fields) = parsed else {
        return Err(EnvelopeError::MalformedReply(
            "expected a JSON object".to_string(),
        ));
    };

    match fields.get("version") {
        Some(Value::String(version)) if version == PROTOCOL_VERSION => {}
        Some(Value::String(other)) => {
            return Err(EnvelopeError::UnsupportedVersion(Some(other.clone())));
        }
        Some(other) => return Err(EnvelopeError::UnsupportedVersion(Some(other.to_string()))),
        None => return Err(EnvelopeError::UnsupportedVersion(None)),
    }

    let client_id = fields
        .get("client")
        .and_then(|client| client.get("id"))
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::MissingClientId)?
        .to_string();

    let Some(Value::Array(events)) = fields.remove("events") else {
        return Err(EnvelopeError::MissingEvents);
    };

    Ok(ReplyEnvelope {
        version: PROTOCOL_VERSION.to_string(),
        client: ClientRef { id: client_id },
        events: events
            .into_iter()
            .map(OutboundEvent::from_reply_element)
            .collect(),
    })
}
