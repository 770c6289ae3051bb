//! Relay orchestration: client submission in, framed events out.

use chat_relay_core::{
    Backend, BackendError, EnvelopeError, InboundMessage, WebhookRequest, decode_reply,
    encode_request, operator_text,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{RegistryError, SessionRegistry};

/// Relay error.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("A client identifier is required")]
    MissingSessionId,
    #[error("message must be a JSON object or array")]
    InvalidPayload,
    #[error("No active SSE connection for client {0}")]
    SessionNotFound(String),
    #[error(transparent)]
    BackendUnavailable(#[from] BackendError),
    #[error("Backend response does not contain an operator message")]
    NoOperatorReply,
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("Delivered {delivered} event(s) before failing: {source}")]
    PartialDelivery {
        delivered: usize,
        #[source]
        source: RegistryError,
    },
}

/// Successful delivery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Number of events written to the session's stream.
    pub delivered: usize,
}

/// Forwards client messages to the backend and delivers its reply events.
///
/// Every stage fails fast and nothing is retried: events already written to
/// a live stream cannot be taken back.
pub struct Relay<B>
where
    B: Backend,
{
    registry: SessionRegistry,
    backend: B,
}

impl<B> Relay<B>
where
    B: Backend,
{
    /// Create a relay over a registry and a backend.
    #[must_use]
    pub const fn new(registry: SessionRegistry, backend: B) -> Self {
        Self { registry, backend }
    }

    /// The registry this relay delivers through.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The backend this relay forwards to.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Relay one client submission.
    ///
    /// # Errors
    /// Returns the first failing stage; see [`RelayError`].
    pub async fn submit(&self, inbound: InboundMessage) -> Result<Delivery, RelayError> {
        let session_id = inbound
            .session
            .resolve()
            .ok_or(RelayError::MissingSessionId)?;

        if !inbound.is_structured() {
            return Err(RelayError::InvalidPayload);
        }

        // Reject before paying for a backend call. Dispatch re-checks below.
        if !self.registry.contains(&session_id).await {
            return Err(RelayError::SessionNotFound(session_id));
        }

        let text = encode_request(&session_id, &inbound.message)?;
        let request = WebhookRequest::new_message(&session_id, text);

        let response = self.backend.post(&request).await.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Backend call failed");
            e
        })?;

        let operator = operator_text(&response).ok_or_else(|| {
            warn!(session_id = %session_id, "Backend reply has no operator message");
            RelayError::NoOperatorReply
        })?;

        let reply = decode_reply(operator)?;
        if reply.client.id != session_id {
            debug!(
                session_id = %session_id,
                reply_client = %reply.client.id,
                "Reply addressed to a different client id"
            );
        }

        let mut delivered = 0;
        for event in &reply.events {
            if let Err(source) = self.registry.dispatch(&session_id, event).await {
                warn!(
                    session_id = %session_id,
                    delivered,
                    remaining = reply.events.len() - delivered,
                    error = %source,
                    "Delivery aborted"
                );
                return Err(RelayError::PartialDelivery { delivered, source });
            }
            delivered += 1;
        }

        info!(session_id = %session_id, delivered, "Reply delivered");
        Ok(Delivery { delivered })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chat_relay_core::{EventSink, PROTOCOL_VERSION, SessionIdSources};
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::{CapturingSink, ScriptedBackend};

    fn backend_reply(events: &Value) -> Value {
        let envelope = json!({
            "version": PROTOCOL_VERSION,
            "client": {"id": "abc"},
            "events": events,
        });
        json!({
            "has_answer": true,
            "messages": [
                {"kind": "client", "text": "ignored"},
                {"kind": "operator", "text": envelope.to_string()},
            ],
        })
    }

    fn from_header(id: &str, message: Value) -> InboundMessage {
        InboundMessage::new(
            SessionIdSources {
                header: Some(id.to_string()),
                ..SessionIdSources::default()
            },
            message,
        )
    }

    async fn relay_with(backend: ScriptedBackend) -> (Relay<ScriptedBackend>, Arc<CapturingSink>) {
        let registry = SessionRegistry::new();
        let sink = CapturingSink::new();
        registry.register("abc", sink.clone()).await;
        (Relay::new(registry, backend), sink)
    }

    #[tokio::test]
    async fn test_delivers_reply_events() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([
            {"name": "greet", "payload": {"text": "hello"}},
        ])));
        let (relay, sink) = relay_with(backend).await;

        let delivery = relay
            .submit(from_header("abc", json!({"text": "hi"})))
            .await
            .unwrap();

        assert_eq!(delivery, Delivery { delivered: 1 });
        assert_eq!(
            sink.frames(),
            vec!["event: greet\ndata: {\"text\":\"hello\"}\n\n".to_string()]
        );
    }

    #[tokio::test]
    async fn test_forwards_request_envelope() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([])));
        let (relay, _sink) = relay_with(backend).await;

        relay
            .submit(from_header("abc", json!({"text": "hi"})))
            .await
            .unwrap();

        let requests = relay.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].event, "new_message");
        assert_eq!(requests[0].chat.id, "abc");
        let envelope: Value = serde_json::from_str(&requests[0].text).unwrap();
        assert_eq!(
            envelope,
            json!({"version": PROTOCOL_VERSION, "client": {"id": "abc"}, "message": {"text": "hi"}})
        );
    }

    #[tokio::test]
    async fn test_preserves_event_order_and_defaults() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([
            {"name": "first", "payload": 1},
            {"payload": 2},
            {"name": "third", "value": 3},
        ])));
        let (relay, sink) = relay_with(backend).await;

        let delivery = relay.submit(from_header("abc", json!([]))).await.unwrap();

        assert_eq!(delivery.delivered, 3);
        assert_eq!(
            sink.frames(),
            vec![
                "event: first\ndata: 1\n\n".to_string(),
                "event: message\ndata: 2\n\n".to_string(),
                "event: third\ndata: {\"name\":\"third\",\"value\":3}\n\n".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_session_id() {
        let (relay, _sink) = relay_with(ScriptedBackend::default()).await;
        let inbound = InboundMessage::new(SessionIdSources::default(), json!({}));

        let result = relay.submit(inbound).await;

        assert!(matches!(result, Err(RelayError::MissingSessionId)));
        assert_eq!(relay.backend().calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_unstructured_payload() {
        let (relay, _sink) = relay_with(ScriptedBackend::default()).await;

        for message in [Value::Null, json!("text"), json!(42)] {
            let result = relay.submit(from_header("abc", message)).await;
            assert!(matches!(result, Err(RelayError::InvalidPayload)));
        }
        assert_eq!(relay.backend().calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_session_skips_backend() {
        let (relay, sink) = relay_with(ScriptedBackend::default()).await;

        let result = relay.submit(from_header("nobody", json!({"text": "hi"}))).await;

        match result {
            Err(RelayError::SessionNotFound(id)) => assert_eq!(id, "nobody"),
            other => panic!("expected SessionNotFound, got {other:?}"),
        }
        assert_eq!(relay.backend().calls(), 0);
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_is_unavailable() {
        let backend = ScriptedBackend::failing(BackendError::Status {
            status: 503,
            body: "down".to_string(),
        });
        let (relay, sink) = relay_with(backend).await;

        let result = relay.submit(from_header("abc", json!({}))).await;

        match result {
            Err(RelayError::BackendUnavailable(BackendError::Status { status, body })) => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_no_answer_is_no_operator_reply() {
        let backend = ScriptedBackend::replying(json!({
            "has_answer": false,
            "messages": [{"kind": "operator", "text": "not an envelope"}],
        }));
        let (relay, _sink) = relay_with(backend).await;

        let result = relay.submit(from_header("abc", json!({}))).await;

        assert!(matches!(result, Err(RelayError::NoOperatorReply)));
    }

    #[tokio::test]
    async fn test_envelope_errors_propagate() {
        let backend = ScriptedBackend::replying(json!({
            "has_answer": true,
            "messages": [{"kind": "operator", "text": "{\"version\":\"2.0.0\"}"}],
        }));
        let (relay, _sink) = relay_with(backend).await;

        let result = relay.submit(from_header("abc", json!({}))).await;

        assert!(matches!(
            result,
            Err(RelayError::Envelope(EnvelopeError::UnsupportedVersion(_)))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_during_delivery_is_partial() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([
            {"name": "a", "payload": 1},
            {"name": "b", "payload": 2},
        ])));
        let (relay, sink) = relay_with(backend).await;
        // Closed sink stands in for a client that went away mid-flight.
        sink.close().await.unwrap();

        let result = relay.submit(from_header("abc", json!({}))).await;

        match result {
            Err(RelayError::PartialDelivery { delivered, source }) => {
                assert_eq!(delivered, 0);
                assert!(matches!(source, RegistryError::Sink { .. }));
            }
            other => panic!("expected PartialDelivery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submission_after_disconnect_is_not_found() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([{"name": "a"}])));
        let registry = SessionRegistry::new();
        let relay = Relay::new(registry.clone(), backend);
        registry.register("abc", CapturingSink::new()).await;
        registry.remove("abc").await;

        let result = relay.submit(from_header("abc", json!({}))).await;

        assert!(matches!(result, Err(RelayError::SessionNotFound(_))));
        assert_eq!(relay.backend().calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_delivery_counts_written_events() {
        let backend = ScriptedBackend::replying(backend_reply(&json!([
            {"name": "a", "payload": 1},
            {"name": "b", "payload": 2},
            {"name": "c", "payload": 3},
        ])));
        let registry = SessionRegistry::new();
        let sink = CapturingSink::closing_after(2);
        registry.register("abc", sink.clone()).await;
        let relay = Relay::new(registry, backend);

        let result = relay.submit(from_header("abc", json!({}))).await;

        match result {
            Err(RelayError::PartialDelivery { delivered, source }) => {
                assert_eq!(delivered, 2);
                assert!(matches!(source, RegistryError::Sink { .. }));
            }
            other => panic!("expected PartialDelivery, got {other:?}"),
        }
        assert_eq!(
            sink.frames(),
            vec![
                "event: a\ndata: 1\n\n".to_string(),
                "event: b\ndata: 2\n\n".to_string(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_while_backend_in_flight() {
        let (backend, gate) = ScriptedBackend::gated();
        backend.push(Ok(backend_reply(&json!([
            {"name": "a", "payload": 1},
            {"name": "b", "payload": 2},
        ]))));
        let registry = SessionRegistry::new();
        let relay = Arc::new(Relay::new(registry.clone(), backend));
        let sink = CapturingSink::new();
        registry.register("abc", sink.clone()).await;

        let submission = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.submit(from_header("abc", json!({"n": 1}))).await }
        });
        gate.entered().await;

        // No registry lock may be held while the backend call is parked.
        tokio::time::timeout(Duration::from_secs(1), registry.remove("abc"))
            .await
            .expect("remove blocked behind an in-flight backend call");
        assert!(!registry.contains("abc").await);
        assert!(sink.is_closed());

        gate.release();
        let result = tokio::time::timeout(Duration::from_secs(1), submission)
            .await
            .unwrap()
            .unwrap();

        match result {
            Err(RelayError::PartialDelivery {
                delivered,
                source: RegistryError::SessionNotFound(id),
            }) => {
                assert_eq!(delivered, 0);
                assert_eq!(id, "abc");
            }
            other => panic!("expected PartialDelivery after disconnect, got {other:?}"),
        }
        assert!(sink.frames().is_empty());
        assert_eq!(relay.backend().calls(), 1);
    }
}
