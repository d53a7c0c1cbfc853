//! Stdio transport.
//!
//! JSON-RPC over stdin/stdout, the usual mode when an MCP client launches the
//! server as a subprocess.

use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use crate::mcp::KvService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Why the serving loop ended.
enum Stop {
    /// The client closed stdin.
    ClientDone,
    /// SIGINT or SIGTERM.
    Signal,
}

pub struct StdioTransport {
    facade: Arc<KvFacade>,
}

impl StdioTransport {
    pub fn new(facade: Arc<KvFacade>) -> Self {
        Self { facade }
    }

    async fn serve(&self) -> KvResult<Stop> {
        let running = KvService::new(Arc::clone(&self.facade))
            .serve(stdio())
            .await
            .map_err(|e| KvError::internal(format!("Cannot start stdio session: {}", e)))?;

        tokio::select! {
            quit = running.waiting() => quit
                .map(|_| Stop::ClientDone)
                .map_err(|e| KvError::internal(format!("Stdio session failed: {}", e))),
            _ = wait_for_signal() => Ok(Stop::Signal),
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> KvResult<()> {
        info!(store = %self.facade.name(), "Serving MCP over stdio");

        let stop = self.serve().await;
        if let Ok(Stop::Signal) = stop {
            info!("Shutdown requested (signal again to exit immediately)");
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Second signal received, exiting");
                std::process::exit(1);
            });
        }

        self.facade.dispose();

        match stop {
            Ok(Stop::ClientDone) => {
                info!("Client closed the stdio session");
                Ok(())
            }
            // a pending stdin read cannot be cancelled, so leave directly
            Ok(Stop::Signal) => std::process::exit(0),
            Err(e) => {
                warn!(error = %e, "Stdio transport stopped with an error");
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
