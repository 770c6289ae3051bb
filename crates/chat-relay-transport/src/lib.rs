//! Transport layer for the chat relay.
//!
//! Provides:
//! - Public request/response shapes
//! - Channel-backed event sink
//! - HTTP event-stream routes (feature: sse)
//! - Webhook backend client (feature: webhook)

pub mod protocol;
pub mod sink;

#[cfg(feature = "sse")]
pub mod sse;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use protocol::{ErrorBody, StreamParams};
pub use sink::ChannelSink;

#[cfg(feature = "sse")]
pub use sse::{ApiError, create_router, cors_layer};

#[cfg(feature = "webhook")]
pub use webhook::{HttpBackend, WebhookConfig};
