//! # TideMCP HTTP Transport
//!
//! Session-multiplexed HTTP transport for TideMCP, using Server-Sent Events for
//! server-to-client delivery.
//!
//! ## Endpoints
//!
//! - `GET /sse` opens an event stream. The first event is `endpoint`, whose data
//!   is the URL to POST requests to (`/message?sessionId=<id>`). Responses
//!   arrive as `message` events; idle streams get a `: keep-alive` comment.
//! - `POST /message?sessionId=<id>` submits one JSON-RPC request.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | Request queued | `202` |
//! | Malformed body or wrong version (error sent on the stream) | `202` |
//! | Missing or unknown `sessionId` | `400` |
//! | Wrong HTTP method | `405` |
//! | Body over `max_body_size` | `413` |
//! | Inbound queue full (error sent on the stream) | `503` |
//!
//! ## Delivery
//!
//! Requests carry the session they arrived on in `origin`. In
//! [`Delivery::Routed`] mode (the default) a response with an origin goes to
//! that session only; [`Delivery::Broadcast`] sends every response to every
//! session.

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
mod server;
mod session;
mod transport;

pub use config::{Delivery, HttpConfig};
pub use server::SESSION_ID_HEADER;
pub use transport::HttpSseTransport;

// Re-export common types for convenience
pub use tidemcp_transport_traits::{
    CancellationToken, RequestStream, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType,
};
