//! Transport construction and the request consumption loop.

use std::sync::Arc;

use futures::StreamExt;
use tidemcp_core::Response;
use tidemcp_http::HttpSseTransport;
use tidemcp_stdio::StdioTransport;
use tidemcp_transport_traits::{CancellationToken, Transport, TransportResult, TransportType};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;

/// Build the transport selected by `config.transport`.
pub fn build_transport(config: &ServerConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportType::Stdio => Arc::new(StdioTransport::new(config.stdio.clone())),
        TransportType::Http => Arc::new(HttpSseTransport::new(config.http.clone())),
    }
}

/// Run `transport` until its request stream ends, then close it.
///
/// Each request is handled on its own task, so a slow handler never holds up
/// the next request. In-flight handlers finish before the transport closes.
/// Cancelling `shutdown` stops the transport from accepting input, which
/// ends the request stream.
pub async fn serve(
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
    shutdown: CancellationToken,
) -> TransportResult<()> {
    let mut requests = transport.receive()?;
    transport.start(shutdown).await?;
    info!(
        transport = %transport.transport_type(),
        endpoint = transport.endpoint().as_deref().unwrap_or("-"),
        "Serving requests"
    );

    let mut handlers = JoinSet::new();
    while let Some(request) = requests.next().await {
        let transport = transport.clone();
        let dispatcher = dispatcher.clone();
        handlers.spawn(async move {
            let method = request.method.clone();
            if let Some(response) = dispatcher.dispatch(request).await {
                deliver(transport.as_ref(), response, &method).await;
            }
        });

        // Reap finished handlers so the set does not grow unbounded
        while let Some(result) = handlers.try_join_next() {
            if let Err(e) = result {
                error!("Request handler panicked: {}", e);
            }
        }
    }

    debug!("Request stream ended, waiting for {} handlers", handlers.len());
    while let Some(result) = handlers.join_next().await {
        if let Err(e) = result {
            error!("Request handler panicked: {}", e);
        }
    }

    let metrics = transport.metrics();
    info!(
        requests = metrics.requests_received,
        responses = metrics.responses_sent,
        protocol_errors = metrics.protocol_errors,
        "Transport finished"
    );
    transport.close().await
}

async fn deliver(transport: &dyn Transport, response: Response, method: &str) {
    match transport.send(response).await {
        Ok(()) => {}
        Err(e) if e.is_recoverable() => {
            warn!(method, "Reply not delivered: {}", e);
        }
        Err(e) => {
            error!(method, "Failed to send reply: {}", e);
        }
    }
}
