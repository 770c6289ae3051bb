//! HTTP event-stream routes.
//!
//! `GET` opens a `text/event-stream` response bound to a session; `POST`
//! submits a message for relay. Both are served on `/api/mcp`, with
//! `/api/stream` and `/api/message` as single-purpose aliases.

use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chat_relay_core::{
    Backend, EnvelopeError, InboundMessage, OutboundEvent, SessionIdSources, inbound::normalise,
};
use chat_relay_session::{ConnectionId, Relay, RelayError, SessionRegistry};
use futures::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use uuid::Uuid;

use crate::{
    ChannelSink,
    protocol::{ErrorBody, SESSION_HEADERS, SESSION_RESPONSE_HEADER, StreamParams, parse_json_body},
};

/// Shared handler state.
pub struct AppState<B>
where
    B: Backend,
{
    /// Relay the handlers drive.
    pub relay: Arc<Relay<B>>,
}

impl<B> Clone for AppState<B>
where
    B: Backend,
{
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
        }
    }
}

/// Error response wrapper mapping relay failures onto status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be read.
    #[error("{0}")]
    BadRequest(String),
    /// Failure reported by the relay.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    /// Status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::Relay(RelayError::MissingSessionId | RelayError::InvalidPayload) => {
                StatusCode::BAD_REQUEST
            }
            Self::Relay(RelayError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Relay(
                RelayError::Envelope(EnvelopeError::Serialization(_))
                | RelayError::PartialDelivery { .. },
            ) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Relay(
                RelayError::BackendUnavailable(_)
                | RelayError::NoOperatorReply
                | RelayError::Envelope(_),
            ) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::BadRequest(message) => ErrorBody::new(message.clone()),
            Self::Relay(e @ RelayError::PartialDelivery { delivered, .. }) => ErrorBody {
                error: e.to_string(),
                delivered: Some(*delivered),
            },
            Self::Relay(e) => ErrorBody::new(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Create the relay router.
///
/// # Example
/// ```ignore
/// let relay = Arc::new(Relay::new(SessionRegistry::new(), backend));
/// let app = create_router(relay).layer(cors_layer());
/// ```
pub fn create_router<B>(relay: Arc<Relay<B>>) -> Router
where
    B: Backend + 'static,
{
    Router::new()
        .route("/api/mcp", get(open_stream::<B>).post(submit_message::<B>))
        .route("/api/stream", get(open_stream::<B>))
        .route("/api/message", post(submit_message::<B>))
        .with_state(AppState { relay })
}

/// CORS policy for browser clients.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_RESPONSE_HEADER);
    let mut allowed = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    allowed.extend(SESSION_HEADERS.into_iter().map(HeaderName::from_static));

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list(allowed))
        .expose_headers([session_header])
}

/// First non-empty session header, in [`SESSION_HEADERS`] order.
fn header_session_id(headers: &HeaderMap) -> Option<String> {
    SESSION_HEADERS
        .into_iter()
        .find_map(|name| normalise(headers.get(name).and_then(|v| v.to_str().ok())))
}

async fn open_stream<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Response
where
    B: Backend + 'static,
{
    let sources = SessionIdSources {
        header: header_session_id(&headers),
        query: params.client_id,
        body: None,
    };
    let session_id = sources.resolve().unwrap_or_else(|| {
        let generated = Uuid::new_v4().to_string();
        tracing::debug!(session_id = %generated, "Generated session id for stream");
        generated
    });

    let Ok(session_header) = HeaderValue::from_str(&session_id) else {
        return ApiError::BadRequest("Session id is not a valid header value".to_string())
            .into_response();
    };

    let registry = state.relay.registry().clone();
    let (sink, rx) = ChannelSink::new();
    let connection = registry.register(&session_id, Arc::new(sink)).await;

    if let Err(e) = registry
        .dispatch(&session_id, &OutboundEvent::ready(&session_id))
        .await
    {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to send ready event");
    }

    let stream = SessionStream {
        inner: UnboundedReceiverStream::new(rx),
        _release: ReleaseOnDrop {
            registry,
            session_id,
            connection,
        },
    };

    let mut response = Response::new(Body::from_stream(stream));
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(HeaderName::from_static(SESSION_RESPONSE_HEADER), session_header);
    response
}

async fn submit_message<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    B: Backend + 'static,
{
    let body = parse_json_body(&body).map_err(ApiError::BadRequest)?;

    let mut inbound = InboundMessage::from_body(body);
    inbound.session.header = header_session_id(&headers);
    inbound.session.query = params.client_id;

    let delivery = state.relay.submit(inbound).await?;
    Ok(Json(delivery).into_response())
}

/// Releases the session when the response body is dropped, which is how a
/// client disconnect surfaces.
struct ReleaseOnDrop {
    registry: SessionRegistry,
    session_id: String,
    connection: ConnectionId,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = self.registry.clone();
        let session_id = std::mem::take(&mut self.session_id);
        let connection = self.connection;
        handle.spawn(async move {
            if registry.release(&session_id, connection).await {
                tracing::info!(session_id = %session_id, "Client disconnected");
            }
        });
    }
}

struct SessionStream {
    inner: UnboundedReceiverStream<Bytes>,
    _release: ReleaseOnDrop,
}

impl Stream for SessionStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|frame| frame.map(Ok))
    }
}
