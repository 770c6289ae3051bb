//! Public request/response shapes for the relay's HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request headers that may carry the session id, in precedence order.
pub const SESSION_HEADERS: [&str; 3] = ["mcp-session-id", "x-mcp-session-id", "x-client-id"];

/// Response header echoing the session id of an opened stream.
pub const SESSION_RESPONSE_HEADER: &str = "mcp-session-id";

/// Query parameters accepted by both routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamParams {
    /// Session id supplied as `?client_id=`.
    pub client_id: Option<String>,
}

/// JSON error body returned for every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Events already written when delivery aborted part way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,
}

impl ErrorBody {
    /// Create an error body with just a message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            delivered: None,
        }
    }
}

/// Parse a submitted request body. An empty body reads as `{}`.
///
/// # Errors
/// Returns a message suitable for a client-error response if the body is
/// not valid JSON.
pub fn parse_json_body(raw: &[u8]) -> Result<Value, String> {
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(raw).map_err(|e| format!("Unable to parse JSON body: {e}"))
}
