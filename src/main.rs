//! KV MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to read and write a Redis-compatible key-value store.

use kv_mcp_server::config::{Config, TransportMode};
use kv_mcp_server::facade::KvFacade;
use kv_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    let settings = match config.store_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Usage: kv-mcp-server --store <url>");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  kv-mcp-server --store redis://127.0.0.1:6379/0");
            eprintln!("  kv-mcp-server --store redis://:secret@cache.local:6380/2?pool_size=32");
            eprintln!("  kv-mcp-server --store redis://localhost?timeout=10&client_name=mcp");
            eprintln!("  kv-mcp-server --store memory://");
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        "Starting KV MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    info!(
        address = %settings.address(),
        database = settings.database,
        pool_size = settings.pool_size,
        "Connecting to store"
    );
    let facade = Arc::new(KvFacade::connect(&settings).await?);

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(facade).run().await
        }
        TransportMode::Http => {
            let transport = HttpTransport::from_config(facade, &config);
            info!(
                addr = %transport.bind_addr(),
                endpoint = %transport.endpoint(),
                "Using HTTP transport"
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
