//! JSON-RPC 2.0 wire types.
//!
//! These are plain data: a [`Request`] decoded from inbound bytes, a [`Response`]
//! produced by the application layer, and the [`JsonRpcError`] object carried by
//! error responses. Validation of inbound bytes lives in the transport layer.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::session::SessionId;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier - can be string or number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Deserializes a present field as `Some`, keeping an explicit `null` distinct
/// from an absent field.
fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Inbound JSON-RPC request or notification.
///
/// A request without an `id` is a notification. The transport does not treat
/// notifications specially; it is up to the dispatcher whether to reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// JSON-RPC version
    pub jsonrpc: String,
    /// Request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Session the request arrived on. Set by session-aware transports, never on the wire.
    #[serde(skip)]
    pub origin: Option<SessionId>,
}

impl Request {
    /// Create a new JSON-RPC request
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id.into()),
            method: method.into(),
            params,
            origin: None,
        }
    }

    /// Create a notification (no `id`)
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: method.into(),
            params,
            origin: None,
        }
    }

    /// Tag the request with the session it arrived on
    #[must_use]
    pub fn with_origin(mut self, origin: SessionId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Returns `true` if no response is expected by the protocol
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional data to the error
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Create a parse error (-32700)
    #[must_use]
    pub fn parse_error() -> Self {
        JsonRpcErrorCode::ParseError.into()
    }

    /// Create an invalid request error (-32600)
    #[must_use]
    pub fn invalid_request() -> Self {
        JsonRpcErrorCode::InvalidRequest.into()
    }

    /// Create a method not found error (-32601)
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound.code(),
            format!("Method not found: {}", method),
        )
    }

    /// Create an invalid params error (-32602)
    #[must_use]
    pub fn invalid_params(details: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::InvalidParams.code(),
            format!("Invalid params: {}", details),
        )
    }

    /// Create an internal error (-32603)
    #[must_use]
    pub fn internal_error() -> Self {
        JsonRpcErrorCode::InternalError.into()
    }

    /// Get the error code
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Error codes are always negative, reserved or application-defined.
    #[must_use]
    pub const fn is_valid_code(&self) -> bool {
        self.code < 0
    }

    /// Check if this is a parse error
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        self.code == JsonRpcErrorCode::ParseError.code()
    }

    /// Check if this is an invalid request error
    #[must_use]
    pub const fn is_invalid_request(&self) -> bool {
        self.code == JsonRpcErrorCode::InvalidRequest.code()
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// JSON-RPC response message.
///
/// Callers populate exactly one of `result` / `error`; the transport delivers
/// either combination unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// JSON-RPC version
    #[serde(default)]
    pub jsonrpc: String,
    /// Response ID, `null` when the request id could not be recovered
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Response result
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Response error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Session the reply should be routed to, never on the wire
    #[serde(skip)]
    pub origin: Option<SessionId>,
}

impl Response {
    /// Create a success response
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
            origin: None,
        }
    }

    /// Create an error response
    #[must_use]
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
            origin: None,
        }
    }

    /// Start a reply to `request`: same id, same origin session, no payload yet.
    #[must_use]
    pub fn reply_to(request: &Request) -> Self {
        Self {
            jsonrpc: default_version(),
            id: request.id.clone(),
            result: None,
            error: None,
            origin: request.origin.clone(),
        }
    }

    /// Set the success payload
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Set the error payload
    #[must_use]
    pub fn with_error(mut self, error: JsonRpcError) -> Self {
        self.error = Some(error);
        self
    }

    /// Route the response to a specific session
    #[must_use]
    pub fn with_origin(mut self, origin: SessionId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Fill in the protocol version when the caller left it empty
    pub fn normalize(&mut self) {
        if self.jsonrpc.is_empty() {
            self.jsonrpc = default_version();
        }
    }

    /// Check if this is an error response
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    InternalError,
    /// Application-defined error
    ApplicationError(i32),
}

impl JsonRpcErrorCode {
    /// Get the numeric code
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ApplicationError(code) => *code,
        }
    }

    /// Get the standard message
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ApplicationError(_) => "Application error",
        }
    }

    /// Reserved codes are -32768..=-32000
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        let code = self.code();
        code >= -32768 && code <= -32000
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<i32> for JsonRpcErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            other => Self::ApplicationError(other),
        }
    }
}

impl From<JsonRpcErrorCode> for JsonRpcError {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }
}
