//! Core transport types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Enumerates the transports the server can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Newline-delimited JSON over a byte stream pair (stdin/stdout).
    Stdio,
    /// HTTP with Server-Sent Events for server-to-client delivery.
    Http,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown transport '{other}', expected 'stdio' or 'http'")),
        }
    }
}

/// Lifecycle state of a transport.
///
/// A transport moves `Created -> Running -> Closed`, or straight from
/// `Created` to `Closed`. There is no way back out of `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    /// Constructed, `start` not yet called.
    Created,
    /// Background activity is running.
    Running,
    /// `close` was called; every further `start`/`send` fails.
    Closed,
}

impl TransportState {
    /// Returns `true` once the transport has been closed.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_serde() {
        assert_eq!(
            serde_json::to_string(&TransportType::Stdio).unwrap(),
            "\"stdio\""
        );
        let parsed: TransportType = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(parsed, TransportType::Http);
    }

    #[test]
    fn test_transport_type_from_str() {
        assert_eq!("stdio".parse::<TransportType>(), Ok(TransportType::Stdio));
        assert_eq!("HTTP".parse::<TransportType>(), Ok(TransportType::Http));
        assert!("websocket".parse::<TransportType>().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransportState::Running.to_string(), "running");
        assert!(TransportState::Closed.is_closed());
        assert!(!TransportState::Created.is_closed());
    }
}
