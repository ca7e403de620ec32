//! Memory gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  MEMORY GATEWAY                  │
//!                      │                                                  │
//!   Client Request     │  ┌──────────┐   ┌─────────────────────────────┐  │
//!   ───────────────────┼─▶│   http   │──▶│       access pipeline       │  │
//!                      │  │  server  │   │ origin filter → credential  │  │
//!                      │  └──────────┘   └──────────────┬──────────────┘  │
//!                      │                                ▼                 │
//!                      │                        ┌──────────────┐          │
//!                      │                        │ mcp handler  │          │
//!                      │                        │ + tools      │          │
//!                      │                        └──────┬───────┘          │
//!                      │                   ┌───────────┴──────────┐       │
//!                      │                   ▼                      ▼       │
//!                      │           ┌──────────────┐       ┌────────────┐  │
//!                      │           │ record store │       │   vault    │  │
//!                      │           │  (5 tables)  │       │ (files)    │  │
//!                      │           └──────────────┘       └────────────┘  │
//!                      │                                                  │
//!                      │  cross-cutting: config, observability, lifecycle │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use memory_gateway::config;
use memory_gateway::lifecycle::{signals, Shutdown};
use memory_gateway::observability::{logging, metrics};
use memory_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "memory-gateway")]
#[command(about = "Personal knowledge gateway: records, vault and tools over JSON-RPC", long_about = None)]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.listener.host = host;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("memory-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        data_dir = %config.store.data_dir.display(),
        vault = %config.vault.root.display(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        // Validation already checked the address parses.
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
        }
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
