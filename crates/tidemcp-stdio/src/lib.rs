//! # TideMCP STDIO Transport
//!
//! Line transport for TideMCP: newline-delimited JSON-RPC over a byte stream
//! pair, by default the process's stdin/stdout.
//!
//! - **Newline-delimited JSON**: one message per line, empty lines ignored
//! - **No embedded newlines**: an encoded response containing `\n` or `\r` is refused
//! - **Immediate error replies**: malformed or version-mismatched lines are answered
//!   on the same stream and never reach the request queue
//! - **Serialized writes**: every write happens under one lock, so concurrent
//!   `send` calls never interleave bytes
//! - **stderr for logging**: uses `tracing`, which the binary routes to stderr
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidemcp_stdio::{StdioConfig, StdioTransport};
//! use tidemcp_transport_traits::{CancellationToken, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = StdioTransport::new(StdioConfig::default());
//!     let requests = transport.receive().unwrap();
//!     transport.start(CancellationToken::new()).await.unwrap();
//!     // consume `requests`, answer with `transport.send(..)`
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

mod config;
mod transport;

pub use config::{MIN_INBOUND_CAPACITY, StdioConfig};
pub use transport::StdioTransport;

// Re-export common types for convenience
pub use tidemcp_transport_traits::{
    CancellationToken, RequestStream, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType,
};
