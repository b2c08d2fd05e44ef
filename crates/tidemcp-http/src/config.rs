//! HTTP transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidemcp_core::MAX_MESSAGE_SIZE;
use tidemcp_transport_traits::{TransportError, TransportResult};

/// How [`send`](tidemcp_transport_traits::Transport::send) picks target sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Deliver to the session named by the response's `origin`; broadcast when
    /// the response has no origin.
    #[default]
    Routed,

    /// Deliver every response to every registered session.
    Broadcast,
}

/// Configuration for [`HttpSseTransport`](crate::HttpSseTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,

    /// Path of the subscribe (SSE) endpoint.
    pub sse_path: String,

    /// Path of the publish endpoint.
    pub message_path: String,

    /// Seconds between keep-alive comments on an idle event stream.
    pub keep_alive_secs: u64,

    /// Capacity of each session's outbound queue.
    pub session_queue_capacity: usize,

    /// Capacity of the shared inbound queue.
    pub inbound_capacity: usize,

    /// Largest accepted publish body, in bytes.
    pub max_body_size: usize,

    /// Response delivery mode.
    pub delivery: Delivery,

    /// Seconds `close` waits for open connections to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            keep_alive_secs: 30,
            session_queue_capacity: 64,
            inbound_capacity: 256,
            max_body_size: MAX_MESSAGE_SIZE,
            delivery: Delivery::Routed,
            shutdown_grace_secs: 5,
        }
    }
}

impl HttpConfig {
    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keep-alive interval as a [`Duration`].
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// The publish URL announced to a session in its framing event.
    pub fn endpoint_for(&self, session_id: &str) -> String {
        format!("{}?sessionId={}", self.message_path, session_id)
    }

    /// Rejects settings the transport cannot run with.
    pub fn validate(&self) -> TransportResult<()> {
        for (name, path) in [
            ("sse_path", &self.sse_path),
            ("message_path", &self.message_path),
        ] {
            if !path.starts_with('/') {
                return Err(TransportError::ConfigurationError(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }
        if self.sse_path == self.message_path {
            return Err(TransportError::ConfigurationError(
                "sse_path and message_path must differ".to_string(),
            ));
        }
        if self.session_queue_capacity == 0 || self.inbound_capacity == 0 {
            return Err(TransportError::ConfigurationError(
                "queue capacities must be greater than zero".to_string(),
            ));
        }
        if self.keep_alive_secs == 0 {
            return Err(TransportError::ConfigurationError(
                "keep_alive_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(TransportError::ConfigurationError(
                "max_body_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
