//! # TideMCP
//!
//! JSON-RPC 2.0 transport core for MCP servers. Two interchangeable
//! transports sit behind one [`Transport`] trait:
//!
//! - **stdio**: newline-delimited JSON over stdin/stdout ([`StdioTransport`])
//! - **http**: one SSE stream per client session plus a POST endpoint,
//!   multiplexed onto one request stream ([`HttpSseTransport`])
//!
//! Everything above the transport programs against the trait, so the
//! channel is chosen by configuration alone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidemcp::{BuiltinDispatcher, CancellationToken, ServerConfig, build_transport, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let transport = build_transport(&config);
//!     let dispatcher = Arc::new(BuiltinDispatcher::default());
//!     serve(transport, dispatcher, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `tidemcp-core` | Message types |
//! | `tidemcp-transport-traits` | The [`Transport`] trait, errors, validation, metrics |
//! | `tidemcp-stdio` | Line transport |
//! | `tidemcp-http` | Session-multiplexed HTTP/SSE transport |

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

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, LogFormat, LoggingConfig, ServerConfig};
pub use dispatch::{BuiltinDispatcher, Dispatcher};
pub use runtime::{build_transport, serve};

pub use tidemcp_core::{
    JsonRpcError, JsonRpcErrorCode, Request, RequestId, Response, SessionId,
};
pub use tidemcp_http::{Delivery, HttpConfig, HttpSseTransport};
pub use tidemcp_stdio::{StdioConfig, StdioTransport};
pub use tidemcp_transport_traits::{
    CancellationToken, RequestStream, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType,
};
