//! Event sink backed by an unbounded channel feeding a response body.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chat_relay_core::{EventSink, SinkError};
use tokio::sync::mpsc;

/// Sink that forwards frames to the receiving half of a channel.
///
/// The receiver is typically wrapped into a streaming HTTP body. Closing the
/// sink drops the sender, which ends that body.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its frames arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write_frame(&self, frame: String) -> Result<(), SinkError> {
        let guard = self
            .tx
            .lock()
            .map_err(|e| SinkError::Internal(e.to_string()))?;
        let tx = guard.as_ref().ok_or(SinkError::Closed)?;
        tx.send(Bytes::from(frame)).map_err(|_| SinkError::Closed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.tx
            .lock()
            .map_err(|e| SinkError::Internal(e.to_string()))?
            .take();
        Ok(())
    }
}
