//! # TideMCP Core
//!
//! JSON-RPC 2.0 message types shared by every TideMCP transport.
//!
//! - [`Request`]: an inbound request or notification
//! - [`Response`]: an outbound result or error, optionally tagged with the
//!   [`SessionId`] it should be routed to
//! - [`JsonRpcError`] / [`JsonRpcErrorCode`]: protocol error objects
//!
//! ```rust
//! use tidemcp_core::{Request, Response};
//!
//! let request: Request =
//!     serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
//! let response = Response::reply_to(&request).with_result(serde_json::json!({}));
//! assert_eq!(response.id, request.id);
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod jsonrpc;
pub mod session;

pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcErrorCode, Request, RequestId, Response,
};
pub use session::SessionId;

/// Default upper bound for a single encoded message (4 MiB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
