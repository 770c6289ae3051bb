//! Core building blocks for the chat relay.
//!
//! This crate provides the pieces that carry no I/O of their own:
//! - `envelope` - Versioned request/reply envelopes exchanged with the backend
//! - `OutboundEvent` - Named event plus its text event-stream framing
//! - `InboundMessage` - Client submission and session-id resolution
//! - `EventSink` and `Backend` - Capabilities supplied by the transport

pub mod envelope;
pub mod event;
pub mod inbound;
pub mod traits;
pub mod webhook;

pub use envelope::{EnvelopeError, PROTOCOL_VERSION, ReplyEnvelope, decode_reply, encode_request};
pub use event::OutboundEvent;
pub use inbound::{InboundMessage, SessionIdSources};
pub use traits::{Backend, BackendError, EventSink, SinkError};
pub use webhook::{WebhookRequest, operator_text};
