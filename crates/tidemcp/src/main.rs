//! tidemcp server entry point

#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tidemcp::logging::verbosity_level;
use tidemcp::{BuiltinDispatcher, CancellationToken, ServerConfig, TransportType};
use tracing::{info, warn};

/// tidemcp - JSON-RPC transport server over stdio or HTTP/SSE
#[derive(Parser, Debug)]
#[command(name = "tidemcp", version, about, author)]
struct Cli {
    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "TIDEMCP_CONFIG")]
    config: Option<PathBuf>,

    /// Transport to run, overriding the configuration file
    #[arg(short, long)]
    transport: Option<TransportType>,

    /// HTTP port, overriding the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(level) = verbosity_level(self.verbose) {
            config.logging.level = level.to_string();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    config
        .logging
        .init()
        .context("Failed to initialize logging")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_token.cancel();
    });

    let transport = tidemcp::build_transport(&config);
    let dispatcher = Arc::new(BuiltinDispatcher::new(
        config.name.clone(),
        env!("CARGO_PKG_VERSION"),
    ));

    tidemcp::serve(transport, dispatcher, shutdown)
        .await
        .context("Transport failed")?;
    Ok(())
}
