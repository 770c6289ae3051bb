//! Capability traits supplied by the transport.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::WebhookRequest;

/// Sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Channel closed")]
    Closed,
    #[error("Sink error: {0}")]
    Internal(String),
}

/// Outbound channel to a single connected client.
///
/// Implementations wrap whatever the transport uses to stream bytes back to
/// the client. Test doubles implement the same trait.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one already-framed event.
    async fn write_frame(&self, frame: String) -> Result<(), SinkError>;

    /// Close the channel. Writes after close fail with [`SinkError::Closed`].
    async fn close(&self) -> Result<(), SinkError>;
}

/// Backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Backend transport error: {0}")]
    Transport(String),
    #[error("Backend timed out")]
    Timeout,
    #[error("Backend returned an unreadable body: {0}")]
    InvalidBody(String),
}

/// Request/response call to the conversational backend.
///
/// One call per submission, no retries. Implementations enforce their own
/// upper bound on latency and report expiry as [`BackendError::Timeout`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Post a webhook request and return the decoded JSON response body.
    async fn post(&self, request: &WebhookRequest) -> Result<Value, BackendError>;
}
