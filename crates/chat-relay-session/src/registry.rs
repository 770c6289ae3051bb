//! In-memory registry of live session channels.

use std::{collections::HashMap, sync::Arc};

use chat_relay_core::{EventSink, OutboundEvent, SinkError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one registration of a channel, so a stale stream can release
/// its session without tearing down a newer connection for the same id.
pub type ConnectionId = Uuid;

/// Registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No active SSE connection for client {0}")]
    SessionNotFound(String),
    #[error("Failed to write to client {session_id}: {source}")]
    Sink {
        session_id: String,
        #[source]
        source: SinkError,
    },
    #[error("Failed to frame event: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct Binding {
    connection: ConnectionId,
    sink: Arc<dyn EventSink>,
}

/// Thread-safe registry binding each session id to at most one channel.
///
/// Cloning is cheap and every clone shares the same map. All access to a
/// session's channel goes through the registry; callers never keep a channel
/// across a suspension point.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Binding>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `sink` to `session_id`, replacing any existing channel.
    ///
    /// The previous channel is dropped without being notified.
    pub async fn register(&self, session_id: &str, sink: Arc<dyn EventSink>) -> ConnectionId {
        let connection = Uuid::new_v4();
        let previous = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), Binding { connection, sink });

        if let Some(previous) = previous {
            info!(
                session_id = %session_id,
                replaced = %previous.connection,
                connection = %connection,
                "Session channel replaced"
            );
        } else {
            info!(session_id = %session_id, connection = %connection, "Session registered");
        }
        connection
    }

    /// Remove a session and close its channel.
    ///
    /// Close failures are logged and swallowed. Removing an unknown session is
    /// a no-op.
    pub async fn remove(&self, session_id: &str) {
        let binding = self.sessions.write().await.remove(session_id);
        match binding {
            Some(binding) => Self::close(session_id, binding).await,
            None => debug!(session_id = %session_id, "Remove for unknown session ignored"),
        }
    }

    /// Remove a session only if it is still bound to `connection`.
    ///
    /// Returns `true` if the binding was removed.
    pub async fn release(&self, session_id: &str, connection: ConnectionId) -> bool {
        let binding = {
            let mut sessions = self.sessions.write().await;
            let bound_here = sessions
                .get(session_id)
                .is_some_and(|current| current.connection == connection);
            if bound_here {
                sessions.remove(session_id)
            } else {
                None
            }
        };

        match binding {
            Some(binding) => {
                Self::close(session_id, binding).await;
                true
            }
            None => {
                debug!(
                    session_id = %session_id,
                    connection = %connection,
                    "Release skipped, session no longer bound to this connection"
                );
                false
            }
        }
    }

    async fn close(session_id: &str, binding: Binding) {
        if let Err(e) = binding.sink.close().await {
            warn!(session_id = %session_id, error = %e, "Error closing client channel");
        }
        info!(session_id = %session_id, connection = %binding.connection, "Session removed");
    }

    /// Get the channel bound to a session.
    pub async fn lookup(&self, session_id: &str) -> Option<Arc<dyn EventSink>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|binding| Arc::clone(&binding.sink))
    }

    /// Check whether a session has a live channel.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Frame `event` and write it to the session's channel.
    ///
    /// # Errors
    /// Returns [`RegistryError::SessionNotFound`] if no channel is bound, or
    /// [`RegistryError::Sink`] if the write fails.
    pub async fn dispatch(&self, session_id: &str, event: &OutboundEvent) -> Result<(), RegistryError> {
        let frame = event.to_frame()?;

        let sessions = self.sessions.read().await;
        let binding = sessions
            .get(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;

        binding
            .sink
            .write_frame(frame)
            .await
            .map_err(|source| RegistryError::Sink {
                session_id: session_id.to_string(),
                source,
            })
    }

    /// Ids of all registered sessions.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
