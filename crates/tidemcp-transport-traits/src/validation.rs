//! Inbound message validation shared by every transport.
//!
//! Bad input never reaches the inbound queue. It is turned into a
//! [`ProtocolViolation`] and answered on the channel it arrived on with the
//! error response from [`ProtocolViolation::into_response`].

use serde_json::Value;
use thiserror::Error;
use tidemcp_core::{JSONRPC_VERSION, JsonRpcError, Request, RequestId, Response};

use crate::error::{TransportError, TransportResult};

/// Why an inbound message was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolViolation {
    /// The bytes are not a JSON value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The `jsonrpc` member is missing or is not `"2.0"`.
    #[error("Unsupported protocol version: {found:?}")]
    InvalidVersion {
        /// Id recovered from the message, if any
        id: Option<RequestId>,
        /// The version that was sent
        found: Option<String>,
    },

    /// Well-formed JSON with the right version that is still not a request.
    #[error("Invalid request: {reason}")]
    InvalidShape {
        /// Id recovered from the message, if any
        id: Option<RequestId>,
        /// Decoder message
        reason: String,
    },

    /// The payload exceeds the configured maximum message size.
    #[error("Message of {size} bytes exceeds maximum of {max} bytes")]
    TooLarge {
        /// Size of the refused payload
        size: usize,
        /// Configured maximum
        max: usize,
    },
}

impl ProtocolViolation {
    /// The request id to echo in the error response.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::InvalidVersion { id, .. } | Self::InvalidShape { id, .. } => id.as_ref(),
            Self::Parse(_) | Self::TooLarge { .. } => None,
        }
    }

    /// Builds the synthetic error response for this violation.
    pub fn into_response(self) -> Response {
        let id = self.request_id().cloned();
        let error = match &self {
            Self::Parse(detail) => JsonRpcError::parse_error().with_data(detail.clone()),
            Self::InvalidVersion { found, .. } => {
                JsonRpcError::invalid_request().with_data(match found {
                    Some(found) => format!(
                        "unsupported jsonrpc version \"{found}\", expected \"{JSONRPC_VERSION}\""
                    ),
                    None => format!("missing jsonrpc version, expected \"{JSONRPC_VERSION}\""),
                })
            }
            Self::InvalidShape { reason, .. } => {
                JsonRpcError::invalid_request().with_data(reason.clone())
            }
            Self::TooLarge { .. } => JsonRpcError::invalid_request().with_data(self.to_string()),
        };
        Response::error(id, error)
    }
}

fn recover_id(value: &Value) -> Option<RequestId> {
    match value.get("id")? {
        Value::String(s) => Some(RequestId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

/// Decodes one inbound message into a [`Request`].
///
/// # Errors
///
/// Returns the [`ProtocolViolation`] to answer with when the payload is
/// oversized, not JSON, has the wrong protocol version, or is not a request.
pub fn decode_request(payload: &[u8], max_size: usize) -> Result<Request, ProtocolViolation> {
    if payload.len() > max_size {
        return Err(ProtocolViolation::TooLarge {
            size: payload.len(),
            max: max_size,
        });
    }

    let value: Value =
        serde_json::from_slice(payload).map_err(|e| ProtocolViolation::Parse(e.to_string()))?;
    let id = recover_id(&value);

    match value.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        other => {
            return Err(ProtocolViolation::InvalidVersion {
                id,
                found: other.map(|v| match v {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                }),
            });
        }
    }

    serde_json::from_value(value).map_err(|e| ProtocolViolation::InvalidShape {
        id,
        reason: e.to_string(),
    })
}

/// Encodes a response as compact JSON after filling in a missing version.
///
/// # Errors
///
/// Fails with [`TransportError::ProtocolError`] when the error object carries a
/// non-negative code, or with a serialization error.
pub fn encode_response(response: &mut Response) -> TransportResult<String> {
    response.normalize();
    if let Some(error) = &response.error
        && !error.is_valid_code()
    {
        return Err(TransportError::ProtocolError(format!(
            "error code {} is not negative",
            error.code
        )));
    }
    Ok(serde_json::to_string(response)?)
}
