//! The transport contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tidemcp_core::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;
use crate::metrics::TransportMetrics;
use crate::types::{TransportState, TransportType};

/// Lazy, non-restartable stream of accepted requests.
///
/// The stream ends when the transport stops accepting input; consumers treat
/// end-of-stream as normal termination.
pub type RequestStream = Pin<Box<dyn Stream<Item = Request> + Send + 'static>>;

/// The abstraction the application programs against.
///
/// Every implementation feeds one bounded inbound queue, exposed through
/// [`receive`](Transport::receive), and delivers responses through
/// [`send`](Transport::send). Which channel carried the bytes is invisible
/// above this trait.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current lifecycle state.
    async fn state(&self) -> TransportState;

    /// Spawns the background read/accept activity and returns promptly.
    ///
    /// Cancelling `shutdown` stops the background loop and ends the request
    /// stream. Calling `start` on a running transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`](crate::TransportError::Closed) after
    /// [`close`](Transport::close), or a setup error if the channel cannot be opened.
    async fn start(&self, shutdown: CancellationToken) -> TransportResult<()>;

    /// Delivers one response toward the connected client(s) without blocking
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Fails when the transport is closed, when there is nobody to deliver to,
    /// or when the delivery path is saturated.
    async fn send(&self, response: Response) -> TransportResult<()>;

    /// Hands out the inbound request stream. Succeeds once per transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReceiverTaken`](crate::TransportError::ReceiverTaken)
    /// on every call after the first.
    fn receive(&self) -> TransportResult<RequestStream>;

    /// Releases every resource and makes further `start`/`send` calls fail.
    /// Idempotent and safe to race with cancellation of the start token.
    async fn close(&self) -> TransportResult<()>;

    /// Returns a snapshot of the transport's counters.
    fn metrics(&self) -> TransportMetrics;

    /// Returns the endpoint address or identifier for this transport, if applicable.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
