//! Streamable HTTP transport.
//!
//! Serves MCP over HTTP with SSE responses through axum. Every MCP session
//! gets its own `KvService`; all of them share one facade and therefore one
//! connection pool.

use crate::config::Config;
use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use crate::mcp::KvService;
use crate::transport::{Transport, wait_for_signal};
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// How long open SSE streams may keep the server alive after the first signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    facade: Arc<KvFacade>,
    /// `host:port`
    bind_addr: String,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        facade: Arc<KvFacade>,
        host: impl AsRef<str>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            facade,
            bind_addr: format!("{}:{}", host.as_ref(), port),
            endpoint: endpoint.into(),
        }
    }

    /// Build the transport from the `--http-*` and `--mcp-endpoint` options.
    pub fn from_config(facade: Arc<KvFacade>, config: &Config) -> Self {
        Self {
            facade,
            bind_addr: config.http_bind_addr(),
            endpoint: config.mcp_endpoint.clone(),
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Mount the MCP service at the configured endpoint.
    fn router(&self) -> Router {
        let facade = Arc::clone(&self.facade);
        let mcp = StreamableHttpService::new(
            move || Ok(KvService::new(Arc::clone(&facade))),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service panics on "/"
        match self.endpoint.as_str() {
            "/" => Router::new().fallback_service(mcp),
            path => Router::new().nest_service(path, mcp),
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> KvResult<()> {
        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            KvError::connection(
                format!("Cannot listen on {}: {}", self.bind_addr, e),
                "Pick another --http-port or stop the process holding it",
            )
        })?;
        info!(
            addr = %self.bind_addr,
            endpoint = %self.endpoint,
            store = %self.facade.name(),
            "HTTP transport listening"
        );

        let signalled = Arc::new(Notify::new());
        let graceful = {
            let signalled = Arc::clone(&signalled);
            async move {
                wait_for_signal().await;
                signalled.notify_one();
            }
        };
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(graceful);

        let outcome = tokio::select! {
            served = server => served.map_err(|e| {
                error!(error = %e, "HTTP server failed");
                KvError::internal(format!("HTTP server failed: {}", e))
            }),
            _ = drain_deadline(signalled) => Ok(()),
        };

        info!("HTTP transport stopped, releasing store connections");
        self.facade.dispose();
        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Resolves once shutdown has begun and either the drain timeout elapsed or a
/// second signal arrived.
async fn drain_deadline(signalled: Arc<Notify>) {
    signalled.notified().await;
    info!(
        timeout_secs = DRAIN_TIMEOUT.as_secs(),
        "Draining open sessions (signal again to stop now)"
    );
    tokio::select! {
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => warn!("Drain timeout reached, stopping"),
        _ = wait_for_signal() => warn!("Second signal received, stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;

    fn facade() -> Arc<KvFacade> {
        Arc::new(KvFacade::new(&StoreSettings::memory()).unwrap())
    }

    #[test]
    fn test_new() {
        let transport = HttpTransport::new(facade(), "0.0.0.0", 3000, "/api/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
        assert_eq!(transport.endpoint(), "/api/mcp");
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default_config();
        config.http_port = 9123;
        config.mcp_endpoint = "/".to_string();

        let transport = HttpTransport::from_config(facade(), &config);
        assert_eq!(transport.bind_addr(), format!("{}:9123", config.http_host));
        assert_eq!(transport.endpoint(), "/");
    }

    #[tokio::test]
    async fn test_root_and_nested_routers_build() {
        let _root = HttpTransport::new(facade(), "127.0.0.1", 0, "/").router();
        let _nested = HttpTransport::new(facade(), "127.0.0.1", 0, "/mcp").router();
    }

    #[tokio::test]
    async fn test_occupied_port_is_connection_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let transport = HttpTransport::new(facade(), "127.0.0.1", port, "/mcp");
        let err = transport.run().await.unwrap_err();
        assert!(matches!(err, KvError::Connection { .. }));
    }
}
