//! Webhook body exchanged with the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook event type for a client message.
pub const NEW_MESSAGE_EVENT: &str = "new_message";

/// Chat reference inside the webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: String,
}

/// Body posted to the backend webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// Always [`NEW_MESSAGE_EVENT`].
    pub event: String,
    /// Chat the message belongs to (the session id).
    pub chat: ChatRef,
    /// Serialized request envelope.
    pub text: String,
}

impl WebhookRequest {
    /// Wrap a serialized request envelope for a session.
    #[must_use]
    pub fn new_message(session_id: &str, text: String) -> Self {
        Self {
            event: NEW_MESSAGE_EVENT.to_string(),
            chat: ChatRef {
                id: session_id.to_string(),
            },
            text,
        }
    }
}

/// Find the operator reply text in a webhook response.
///
/// Requires `has_answer: true` and a `messages` array; returns the `text` of
/// the first element whose `kind` is `"operator"`, if that text is a string.
#[must_use]
pub fn operator_text(response: &Value) -> Option<&str> {
    if response.get("has_answer").and_then(Value::as_bool) != Some(true) {
        return None;
    }

    response
        .get("messages")?
        .as_array()?
        .iter()
        .find(|msg| msg.get("kind").and_then(Value::as_str) == Some("operator"))?
        .get("text")?
        .as_str()
}
