//! Request dispatch.
//!
//! [`Dispatcher`] is where a tool router plugs in: it turns one accepted
//! request into at most one response. [`BuiltinDispatcher`] answers the
//! protocol housekeeping methods and nothing else.

use async_trait::async_trait;
use serde_json::{Value, json};
use tidemcp_core::{JsonRpcError, Request, Response};
use tracing::debug;

/// Protocol revision reported when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Maps a request to its reply.
///
/// Returning `None` means no reply is sent. Replies should be built with
/// [`Response::reply_to`] so they keep the request's id and origin session.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Handle one request
    async fn dispatch(&self, request: Request) -> Option<Response>;
}

/// Answers `ping` and `initialize`; every other method is unknown.
#[derive(Debug, Clone)]
pub struct BuiltinDispatcher {
    name: String,
    version: String,
}

impl BuiltinDispatcher {
    /// Create a dispatcher reporting the given server identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    fn initialize_result(&self, params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        json!({
            "protocolVersion": protocol_version,
            "capabilities": {},
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            }
        })
    }
}

impl Default for BuiltinDispatcher {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl Dispatcher for BuiltinDispatcher {
    async fn dispatch(&self, request: Request) -> Option<Response> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let reply = Response::reply_to(&request);
        let response = match request.method.as_str() {
            "ping" => reply.with_result(json!({})),
            "initialize" => reply.with_result(self.initialize_result(request.params.as_ref())),
            other => reply.with_error(JsonRpcError::method_not_found(other)),
        };
        Some(response)
    }
}
