//! Logging initialization
//!
//! Logs always go to stderr: on the stdio transport, stdout is the protocol
//! channel and a single stray line would corrupt it.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

impl LoggingConfig {
    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` takes precedence over [`LoggingConfig::level`].
    ///
    /// # Errors
    ///
    /// Returns an error if the filter directive is invalid or a global
    /// subscriber is already set.
    pub fn init(&self) -> io::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid log level '{}': {e}", self.level),
                )
            })?;
        let subscriber = tracing_subscriber::registry().with(filter);

        match self.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init(),
            LogFormat::Pretty => subscriber
                .with(fmt::layer().with_target(false).with_writer(io::stderr))
                .try_init(),
        }
        .map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Filter directive for a `-v` count; `None` keeps the configured level.
pub fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}
