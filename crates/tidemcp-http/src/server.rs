//! Axum router and handlers for the subscribe and publish endpoints.
//!
//! - GET `<sse_path>` opens an event stream and registers a session
//! - POST `<message_path>?sessionId=<id>` submits one request for that session
//!
//! Wrong verbs on either path get `405` from the router itself.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use bytes::Bytes;
use futures::stream::Stream;
use parking_lot::Mutex;
use serde::Deserialize;
use tidemcp_core::{JsonRpcError, Request, Response, SessionId};
use tidemcp_transport_traits::{AtomicMetrics, decode_request, encode_response};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::config::HttpConfig;
use crate::session::{DeliveryError, Frame, SessionRegistry};

/// Header carrying the session id on subscribe responses.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// State shared by the handlers and the transport.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: HttpConfig,
    pub(crate) sessions: SessionRegistry,
    pub(crate) metrics: Arc<AtomicMetrics>,
    inbound: Mutex<Option<mpsc::Sender<Request>>>,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        config: HttpConfig,
        inbound: mpsc::Sender<Request>,
        metrics: Arc<AtomicMetrics>,
    ) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(metrics.clone()),
            metrics,
            inbound: Mutex::new(Some(inbound)),
            closed: AtomicBool::new(false),
        }
    }

    /// Stops accepting input: refuses new calls, ends every event stream and
    /// releases the inbound sender so the request stream ends.
    pub(crate) fn shut_down(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.sessions.close();
        self.inbound.lock().take();
        debug!(sessions = dropped, "HTTP transport stopped accepting input");
    }

    /// Queues a synthetic error response on the session a bad request came from.
    fn reply_to_session(&self, session_id: &SessionId, mut response: Response) {
        let frame: Frame = match encode_response(&mut response) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(session_id = %session_id, "Failed to encode error response: {}", e);
                return;
            }
        };
        let size = frame.len();
        match self.sessions.deliver(session_id, frame) {
            Ok(()) => self.metrics.record_response(size),
            Err(DeliveryError::Full) => {
                AtomicMetrics::incr(&self.metrics.responses_dropped);
                warn!(session_id = %session_id, "Session queue full, dropping error response");
            }
            Err(DeliveryError::NotFound) => {
                debug!(session_id = %session_id, "Session vanished before error response");
            }
        }
    }
}

/// Builds the router serving both endpoints over `shared`.
pub(crate) fn router(shared: Arc<Shared>) -> Router {
    let config = &shared.config;
    Router::new()
        .route(&config.sse_path, get(handle_subscribe))
        .route(&config.message_path, post(handle_publish))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .with_state(shared.clone())
}

/// Opens an event stream for a new session.
///
/// The first event is `endpoint`, naming the publish URL for this session.
/// Every later event is a `message` carrying one encoded response, with a
/// keep-alive comment on idle streams.
async fn handle_subscribe(State(shared): State<Arc<Shared>>) -> HttpResponse {
    // Registration and shutdown share the registry lock, so no session is
    // created after `shut_down` cleared the map
    let Some((session_id, mut rx)) = shared
        .sessions
        .create(shared.config.session_queue_capacity)
    else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let endpoint = shared.config.endpoint_for(session_id.as_str());

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(frame) = rx.recv().await {
            yield Ok(Event::default().event("message").data(&*frame));
        }
    };

    // Deregisters the session when the client goes away
    let cleanup_stream = CleanupStream {
        inner: Box::pin(stream),
        sessions: shared.sessions.clone(),
        session_id: session_id.clone(),
    };

    let sse = Sse::new(cleanup_stream).keep_alive(
        KeepAlive::new()
            .interval(shared.config.keep_alive_interval())
            .text("keep-alive"),
    );

    ([(SESSION_ID_HEADER, session_id.to_string())], sse).into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Accepts one request for an existing session.
///
/// Unknown or missing sessions are rejected with `400`. Malformed bodies and
/// version mismatches are accepted with `202` and answered on the session's
/// stream. A full inbound queue answers `503` and queues an internal error.
async fn handle_publish(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> HttpResponse {
    let Some(raw_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    let session_id = SessionId::from(raw_id);
    if !shared.sessions.contains(&session_id) {
        debug!(session_id = %session_id, "Publish for unknown session");
        return (StatusCode::BAD_REQUEST, "Unknown sessionId").into_response();
    }

    let request = match decode_request(&body, shared.config.max_body_size) {
        Ok(request) => request.with_origin(session_id.clone()),
        Err(violation) => {
            warn!(session_id = %session_id, "Rejecting published message: {}", violation);
            AtomicMetrics::incr(&shared.metrics.protocol_errors);
            shared.reply_to_session(&session_id, violation.into_response());
            return StatusCode::ACCEPTED.into_response();
        }
    };

    let Some(inbound) = shared.inbound.lock().clone() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    trace!(session_id = %session_id, method = %request.method, "Accepted request");
    match inbound.try_send(request) {
        Ok(()) => {
            shared.metrics.record_request(body.len());
            StatusCode::ACCEPTED.into_response()
        }
        Err(TrySendError::Full(request)) => {
            warn!(session_id = %session_id, "Inbound queue full, rejecting request");
            AtomicMetrics::incr(&shared.metrics.requests_rejected);
            let response = Response::error(
                request.id,
                JsonRpcError::internal_error().with_data("request queue full"),
            );
            shared.reply_to_session(&session_id, response);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(TrySendError::Closed(_)) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Stream wrapper that deregisters its session when dropped.
struct CleanupStream<S> {
    inner: std::pin::Pin<Box<S>>,
    sessions: SessionRegistry,
    session_id: SessionId,
}

impl<S: Stream<Item = Result<Event, Infallible>>> Stream for CleanupStream<S> {
    type Item = Result<Event, Infallible>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        // The registry lock is synchronous, so no task is needed here
        self.sessions.remove(&self.session_id);
    }
}
