//! # TideMCP Transport Traits
//!
//! The contract every TideMCP transport implements, plus the pieces they share.
//!
//! ## Overview
//!
//! - **Trait**: [`Transport`] with `start` / `send` / `receive` / `close`
//! - **Types**: [`TransportType`], [`TransportState`], [`RequestStream`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Validation**: [`decode_request`], [`encode_response`], [`ProtocolViolation`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidemcp_transport_traits::Transport;
//! use tokio_util::sync::CancellationToken;
//! use futures::StreamExt;
//!
//! async fn pump(transport: &dyn Transport) -> tidemcp_transport_traits::TransportResult<()> {
//!     let mut requests = transport.receive()?;
//!     transport.start(CancellationToken::new()).await?;
//!     while let Some(request) = requests.next().await {
//!         // route the request ...
//!     }
//!     transport.close().await
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod error;
mod metrics;
mod traits;
mod types;
mod validation;

pub use error::{TransportError, TransportResult};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use traits::{RequestStream, Transport};
pub use types::{TransportState, TransportType};
pub use validation::{ProtocolViolation, decode_request, encode_response};

// Cancellation is part of the contract's signature
pub use tokio_util::sync::CancellationToken;
