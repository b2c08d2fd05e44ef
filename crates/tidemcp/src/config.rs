//! Server configuration.
//!
//! Loaded from a TOML, YAML or JSON file and overlaid with `TIDEMCP__*`
//! environment variables. Every field has a default, so an empty file (or no
//! file at all) yields a working stdio server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tidemcp_http::HttpConfig;
use tidemcp_stdio::{MIN_INBOUND_CAPACITY, StdioConfig};
use tidemcp_transport_traits::TransportType;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TIDEMCP";

/// Top-level server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name reported by `initialize`
    pub name: String,
    /// Which transport to run
    pub transport: TransportType,
    /// Line transport settings
    pub stdio: StdioConfig,
    /// HTTP transport settings
    pub http: HttpConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            transport: TransportType::Stdio,
            stdio: StdioConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A setting the server cannot run with
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ServerConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension:
    /// - `.toml` → TOML format
    /// - `.yaml` or `.yml` → YAML format
    /// - `.json` → JSON format
    ///
    /// Environment variables with the `TIDEMCP` prefix override file settings,
    /// with `__` separating nested keys: `TIDEMCP__HTTP__PORT=9000`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tidemcp::ServerConfig;
    ///
    /// let config = ServerConfig::from_file("tidemcp.toml").expect("Failed to load config");
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            // Environment variables override file settings
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Rejects settings the transports cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.stdio.inbound_capacity < MIN_INBOUND_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "stdio.inbound_capacity must be at least {}, got {}",
                MIN_INBOUND_CAPACITY, self.stdio.inbound_capacity
            )));
        }
        if self.stdio.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "stdio.max_message_size must be greater than zero".to_string(),
            ));
        }
        self.http
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("http: {e}")))
    }
}
