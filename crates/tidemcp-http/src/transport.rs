//! Session-multiplexed HTTP transport.
//!
//! [`HttpSseTransport`] runs an axum server exposing a subscribe endpoint
//! (one SSE stream per session) and a publish endpoint (one request per
//! POST). Requests from every session flow into one bounded inbound queue;
//! responses go back out through the owning session's stream.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tidemcp_core::{Request, Response, SessionId};
use tidemcp_transport_traits::{
    AtomicMetrics, CancellationToken, RequestStream, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType, encode_response,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::{Delivery, HttpConfig};
use crate::server::{self, Shared};
use crate::session::{DeliveryError, Frame};

/// The running server task and the token that stops it.
#[derive(Debug)]
struct ServerHandle {
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// HTTP + SSE transport multiplexing many client sessions onto one request stream.
///
/// Accepted requests carry their session in [`Request::origin`]. With
/// [`Delivery::Routed`] a response built by [`Response::reply_to`] goes back
/// to that session only; with [`Delivery::Broadcast`] every response goes to
/// every session.
///
/// # Example
///
/// ```rust,ignore
/// use tidemcp_http::{HttpConfig, HttpSseTransport};
/// use tidemcp_transport_traits::{CancellationToken, Transport};
///
/// let transport = HttpSseTransport::new(HttpConfig { port: 0, ..Default::default() });
/// let requests = transport.receive()?;
/// transport.start(CancellationToken::new()).await?;
/// println!("listening on {:?}", transport.local_addr());
/// ```
#[derive(Debug)]
pub struct HttpSseTransport {
    shared: Arc<Shared>,
    state: Mutex<TransportState>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    server: Mutex<Option<ServerHandle>>,
}

impl HttpSseTransport {
    /// Create a transport; nothing is bound until [`Transport::start`].
    pub fn new(config: HttpConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let metrics = Arc::new(AtomicMetrics::new());

        Self {
            shared: Arc::new(Shared::new(config, tx, metrics)),
            state: Mutex::new(TransportState::Created),
            inbound_rx: Mutex::new(Some(rx)),
            local_addr: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    /// The configuration this transport runs with
    pub fn config(&self) -> &HttpConfig {
        &self.shared.config
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// The router serving this transport's endpoints.
    ///
    /// `start` serves this same router; it is exposed for embedding and for
    /// driving the handlers without a socket.
    ///
    /// # Panics
    ///
    /// Panics when the configured paths fail [`HttpConfig::validate`].
    pub fn router(&self) -> Router {
        server::router(self.shared.clone())
    }

    fn deliver_routed(&self, origin: &SessionId, frame: Frame) -> TransportResult<()> {
        let size = frame.len();
        match self.shared.sessions.deliver(origin, frame) {
            Ok(()) => {
                self.shared.metrics.record_response(size);
                Ok(())
            }
            Err(DeliveryError::NotFound) => Err(TransportError::SessionNotFound(origin.clone())),
            Err(DeliveryError::Full) => {
                AtomicMetrics::incr(&self.shared.metrics.responses_dropped);
                warn!(session_id = %origin, "Session queue full, dropping response");
                Err(TransportError::QueueFull(format!(
                    "Outbound queue for session {} is full",
                    origin
                )))
            }
        }
    }

    fn deliver_broadcast(&self, frame: &Frame) -> TransportResult<()> {
        let outcome = self.shared.sessions.broadcast(frame);
        if outcome.delivered == 0 && outcome.skipped == 0 {
            return Err(TransportError::NoActiveSessions);
        }

        for _ in 0..outcome.delivered {
            self.shared.metrics.record_response(frame.len());
        }
        for _ in 0..outcome.skipped {
            AtomicMetrics::incr(&self.shared.metrics.responses_dropped);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    async fn state(&self) -> TransportState {
        *self.state.lock()
    }

    async fn start(&self, shutdown: CancellationToken) -> TransportResult<()> {
        // axum panics on malformed route paths
        self.shared.config.validate()?;

        let current = *self.state.lock();
        match current {
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Running => {
                debug!("HTTP transport already started");
                return Ok(());
            }
            TransportState::Created => {}
        }

        let addr = self.shared.config.bind_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to bind to {}: {}", addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        let token = shutdown.child_token();
        let app = self.router();
        let shared = self.shared.clone();
        let graceful = token.clone();
        let serve = async move {
            let signal = async move {
                graceful.cancelled().await;
                // Ending the streams lets open SSE connections finish
                shared.shut_down();
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!("HTTP server error: {}", e);
            }
            debug!("HTTP server task completed");
        };

        {
            let mut state = self.state.lock();
            match *state {
                // Closed or started concurrently while binding; the listener is dropped
                TransportState::Closed => return Err(TransportError::Closed),
                TransportState::Running => return Ok(()),
                TransportState::Created => *state = TransportState::Running,
            }
            *self.local_addr.lock() = Some(local_addr);
            *self.server.lock() = Some(ServerHandle {
                task: tokio::spawn(serve),
                shutdown: token,
            });
        }

        info!(
            "HTTP transport listening on http://{} (GET {}, POST {})",
            local_addr, self.shared.config.sse_path, self.shared.config.message_path
        );
        Ok(())
    }

    async fn send(&self, mut response: Response) -> TransportResult<()> {
        if self.state.lock().is_closed() {
            return Err(TransportError::Closed);
        }

        let frame: Frame = encode_response(&mut response)?.into();
        match (self.shared.config.delivery, response.origin.as_ref()) {
            (Delivery::Routed, Some(origin)) => self.deliver_routed(origin, frame),
            _ => self.deliver_broadcast(&frame),
        }
    }

    fn receive(&self) -> TransportResult<RequestStream> {
        let receiver = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(TransportError::ReceiverTaken)?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    async fn close(&self) -> TransportResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_closed() {
                return Ok(());
            }
            *state = TransportState::Closed;
        }

        self.shared.shut_down();

        let handle = self.server.lock().take();
        if let Some(ServerHandle { mut task, shutdown }) = handle {
            shutdown.cancel();
            let grace = self.shared.config.shutdown_grace();
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("HTTP server did not drain within {:?}, aborting", grace);
                task.abort();
            }
        }

        debug!("HTTP transport closed");
        Ok(())
    }

    fn metrics(&self) -> TransportMetrics {
        self.shared.metrics.snapshot()
    }

    fn endpoint(&self) -> Option<String> {
        let host = self
            .local_addr()
            .map_or_else(|| self.shared.config.bind_addr(), |addr| addr.to_string());
        Some(format!("http://{}{}", host, self.shared.config.sse_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tidemcp_core::JsonRpcError;

    fn transport(delivery: Delivery) -> HttpSseTransport {
        HttpSseTransport::new(HttpConfig {
            port: 0,
            delivery,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_initial_state() {
        let transport = transport(Delivery::Routed);
        assert_eq!(transport.state().await, TransportState::Created);
        assert_eq!(transport.transport_type(), TransportType::Http);
        assert_eq!(transport.local_addr(), None);
        assert_eq!(
            transport.endpoint().as_deref(),
            Some("http://127.0.0.1:0/sse")
        );
    }

    #[tokio::test]
    async fn test_send_without_sessions() {
        let transport = transport(Delivery::Broadcast);
        let err = transport
            .send(Response::success(Some(1.into()), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoActiveSessions));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_routed_send_to_unknown_session() {
        let transport = transport(Delivery::Routed);
        let response = Response::success(Some(1.into()), json!({}))
            .with_origin(SessionId::from("gone"));
        let err = transport.send(response).await.unwrap_err();
        assert!(matches!(err, TransportError::SessionNotFound(ref id) if id.as_str() == "gone"));
    }

    #[tokio::test]
    async fn test_routed_send_reaches_only_origin() {
        let transport = transport(Delivery::Routed);
        let (a, mut rx_a) = transport.shared.sessions.create(4).unwrap();
        let (_b, mut rx_b) = transport.shared.sessions.create(4).unwrap();

        let response = Response::success(Some(7.into()), json!("ok")).with_origin(a);
        transport.send(response).await.unwrap();

        let frame = rx_a.try_recv().unwrap();
        let wire: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "id": 7, "result": "ok"}));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(transport.metrics().responses_sent, 1);
    }

    #[tokio::test]
    async fn test_routed_send_to_full_session() {
        let transport = HttpSseTransport::new(HttpConfig {
            session_queue_capacity: 1,
            ..Default::default()
        });
        let (a, _rx) = transport.shared.sessions.create(1).unwrap();

        let response = Response::success(Some(1.into()), json!({})).with_origin(a);
        transport.send(response.clone()).await.unwrap();
        let err = transport.send(response).await.unwrap_err();
        assert!(matches!(err, TransportError::QueueFull(_)));
        assert_eq!(transport.metrics().responses_dropped, 1);
    }

    #[tokio::test]
    async fn test_broadcast_mode_ignores_origin() {
        let transport = transport(Delivery::Broadcast);
        let (a, mut rx_a) = transport.shared.sessions.create(4).unwrap();
        let (_b, mut rx_b) = transport.shared.sessions.create(4).unwrap();

        let response = Response::success(Some(1.into()), json!({})).with_origin(a);
        transport.send(response).await.unwrap();
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert_eq!(transport.metrics().responses_sent, 2);
    }

    #[tokio::test]
    async fn test_send_rejects_non_negative_error_code() {
        let transport = transport(Delivery::Broadcast);
        let (_a, _rx) = transport.shared.sessions.create(4).unwrap();

        let response = Response::error(
            Some(1.into()),
            JsonRpcError::new(100, "not an error code"),
        );
        assert!(matches!(
            transport.send(response).await,
            Err(TransportError::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let transport = HttpSseTransport::new(HttpConfig {
            port: 0,
            sse_path: "sse".into(),
            ..Default::default()
        });
        let err = transport
            .start(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConfigurationError(_)));
        assert_eq!(transport.state().await, TransportState::Created);
        assert_eq!(transport.local_addr(), None);

        let transport = HttpSseTransport::new(HttpConfig {
            port: 0,
            message_path: "/sse".into(),
            ..Default::default()
        });
        assert!(matches!(
            transport.start(CancellationToken::new()).await,
            Err(TransportError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_close_before_start() {
        let transport = transport(Delivery::Routed);
        let mut requests = transport.receive().unwrap();

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(requests.next().await.is_none());
        assert!(matches!(
            transport.start(CancellationToken::new()).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport
                .send(Response::success(Some(1.into()), json!({})))
                .await,
            Err(TransportError::Closed)
        ));
    }
}
