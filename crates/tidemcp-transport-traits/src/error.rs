//! Transport error types.

use thiserror::Error;
use tidemcp_core::SessionId;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Call-level failures returned by [`Transport`](crate::Transport) operations.
///
/// Malformed inbound messages never surface here; they are answered on the wire
/// with a protocol-level error response instead.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport has been closed.
    #[error("Transport is closed")]
    Closed,

    /// The operation requires a started transport.
    #[error("Transport has not been started")]
    NotStarted,

    /// The inbound request stream was already handed out.
    #[error("Request stream already taken")]
    ReceiverTaken,

    /// No client is currently connected to receive a response.
    #[error("No active sessions to deliver to")]
    NoActiveSessions,

    /// The session a response was routed to is gone.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// A bounded queue was saturated.
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A protocol-level invariant was violated by an outbound message.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to bind or establish the underlying channel.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Returns `true` for failures the caller should log and move past
    /// rather than treat as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoActiveSessions | Self::SessionNotFound(_) | Self::QueueFull(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}
