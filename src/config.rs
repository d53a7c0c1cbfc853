//! Configuration handling for the KV MCP Server.
//!
//! This module provides configuration management via CLI arguments and environment variables,
//! and turns a store URL into the settings the facade is built from.

use crate::pool::PoolConfig;
use crate::store::{Connector, MemoryStore};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/0";

// Store defaults
pub const DEFAULT_STORE_PORT: u16 = 6379;
pub const DEFAULT_DATABASE_COUNT: u32 = 16;
pub const MIN_POOL_SIZE: usize = 16;
pub const DEFAULT_MAX_IDLE: usize = 8;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5;

/// Which backend a store URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScheme {
    /// A RESP server reached over TCP.
    Redis,
    /// The embedded in-process store.
    Memory,
}

/// Connection settings for the store, parsed from a URL.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub scheme: StoreScheme,
    pub host: String,
    pub port: u16,
    /// Sensitive - not logged.
    pub password: Option<String>,
    /// Logical database selected at startup.
    pub database: u32,
    /// Number of logical databases the server exposes.
    pub databases: u32,
    /// Pool capacity, never below `MIN_POOL_SIZE`.
    pub pool_size: usize,
    pub max_idle: usize,
    pub acquire_timeout: Duration,
    /// Per-command timeout on TCP connections.
    pub timeout: Duration,
    pub client_name: Option<String>,
}

impl StoreSettings {
    /// Query keys recognised in a store URL.
    const OPTION_KEYS: &'static [&'static str] = &[
        "pool_size",
        "max_idle",
        "acquire_timeout",
        "timeout",
        "databases",
        "client_name",
    ];

    /// Parse a store URL.
    ///
    /// # Format
    ///
    /// ```text
    /// redis://[:password@]host[:port][/db][?options]
    /// memory://[/db][?options]
    /// ```
    ///
    /// Options: `pool_size`, `max_idle`, `acquire_timeout` (seconds), `timeout` (seconds),
    /// `databases`, `client_name`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let url = Url::parse(s.trim()).map_err(|e| format!("Invalid store URL: {e}"))?;

        let scheme = match url.scheme().to_ascii_lowercase().as_str() {
            "redis" => StoreScheme::Redis,
            "memory" => StoreScheme::Memory,
            other => {
                return Err(format!(
                    "Unsupported store scheme '{other}'. Use redis:// or memory://"
                ));
            }
        };

        let mut opts = Self::extract_options(&url)?;

        let host = match scheme {
            StoreScheme::Redis => url
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| "Store URL requires a host, e.g. redis://localhost:6379".to_string())?
                .to_string(),
            StoreScheme::Memory => "memory".to_string(),
        };
        let port = url.port().unwrap_or(DEFAULT_STORE_PORT);
        let password = url.password().filter(|p| !p.is_empty()).map(String::from);

        let databases = parse_opt(&mut opts, "databases")?.unwrap_or(DEFAULT_DATABASE_COUNT);
        if databases == 0 {
            return Err("databases must be greater than 0".to_string());
        }
        let database = Self::database_index(&url)?;
        if database >= databases {
            return Err(format!(
                "Database {database} is out of range (server exposes {databases})"
            ));
        }

        let pool_size = parse_opt(&mut opts, "pool_size")?
            .unwrap_or(MIN_POOL_SIZE)
            .max(MIN_POOL_SIZE);
        let max_idle = parse_opt(&mut opts, "max_idle")?
            .unwrap_or(DEFAULT_MAX_IDLE)
            .min(pool_size);
        let acquire_timeout = Duration::from_secs(
            parse_opt(&mut opts, "acquire_timeout")?.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        );
        let timeout = Duration::from_secs(
            parse_opt(&mut opts, "timeout")?.unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS),
        );
        if timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        let client_name = opts.remove("client_name").filter(|n| !n.trim().is_empty());

        Ok(Self {
            scheme,
            host,
            port,
            password,
            database,
            databases,
            pool_size,
            max_idle,
            acquire_timeout,
            timeout,
            client_name,
        })
    }

    /// Settings for a fresh embedded store with default sizing.
    pub fn memory() -> Self {
        Self {
            scheme: StoreScheme::Memory,
            host: "memory".to_string(),
            port: DEFAULT_STORE_PORT,
            password: None,
            database: 0,
            databases: DEFAULT_DATABASE_COUNT,
            pool_size: MIN_POOL_SIZE,
            max_idle: DEFAULT_MAX_IDLE,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            client_name: None,
        }
    }

    /// `host:port` for TCP stores, `memory` for the embedded one.
    pub fn address(&self) -> String {
        match self.scheme {
            StoreScheme::Redis => format!("{}:{}", self.host, self.port),
            StoreScheme::Memory => "memory".to_string(),
        }
    }

    /// Build the connection factory these settings describe.
    ///
    /// Every call with `memory://` settings creates a new, empty store.
    pub fn connector(&self) -> Connector {
        match self.scheme {
            StoreScheme::Redis => Connector::Tcp {
                address: self.address(),
                password: self.password.clone(),
                client_name: self.client_name.clone(),
                timeout: self.timeout,
            },
            StoreScheme::Memory => Connector::Memory(MemoryStore::new()),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            capacity: self.pool_size,
            max_idle: self.max_idle,
            acquire_timeout: self.acquire_timeout,
        }
    }

    /// Extract the recognised options, rejecting unknown keys.
    fn extract_options(url: &Url) -> Result<HashMap<String, String>, String> {
        let mut opts = HashMap::new();
        for (k, v) in url.query_pairs() {
            let key = k.to_ascii_lowercase();
            if !Self::OPTION_KEYS.contains(&key.as_str()) {
                return Err(format!(
                    "Unknown store option '{}'. Supported: {}",
                    k,
                    Self::OPTION_KEYS.join(", ")
                ));
            }
            opts.insert(key, v.into_owned());
        }
        Ok(opts)
    }

    fn database_index(url: &Url) -> Result<u32, String> {
        let path = url.path().trim_matches('/');
        if path.is_empty() {
            return Ok(0);
        }
        path.parse()
            .map_err(|_| format!("Invalid database index '{path}' in store URL"))
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::memory()
    }
}

fn parse_opt<T: std::str::FromStr>(
    opts: &mut HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, String> {
    opts.remove(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| format!("Invalid value '{v}' for store option '{key}'"))
        })
        .transpose()
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the KV MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kv-mcp-server",
    about = "MCP server exposing typed, pooled access to a Redis-compatible key-value store",
    version,
    author
)]
pub struct Config {
    /// Store URL: redis://[:password@]host[:port][/db][?options] or memory://
    #[arg(
        short = 's',
        long = "store",
        value_name = "URL",
        default_value = DEFAULT_STORE_URL,
        env = "KV_STORE"
    )]
    pub store: String,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            store: DEFAULT_STORE_URL.to_string(),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Parse the store URL.
    pub fn store_settings(&self) -> Result<StoreSettings, String> {
        StoreSettings::parse(&self.store)
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_bind_addr(), "127.0.0.1:8080");
        let settings = config.store_settings().unwrap();
        assert_eq!(settings.address(), "127.0.0.1:6379");
    }

    #[test]
    fn test_parse_full_redis_url() {
        let settings = StoreSettings::parse(
            "redis://:s3cret@cache.local:6380/3?pool_size=32&max_idle=4&acquire_timeout=2&timeout=1&client_name=mcp",
        )
        .unwrap();
        assert_eq!(settings.scheme, StoreScheme::Redis);
        assert_eq!(settings.address(), "cache.local:6380");
        assert_eq!(settings.password.as_deref(), Some("s3cret"));
        assert_eq!(settings.database, 3);
        assert_eq!(settings.pool_size, 32);
        assert_eq!(settings.max_idle, 4);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(2));
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert_eq!(settings.client_name.as_deref(), Some("mcp"));
    }

    #[test]
    fn test_defaults_applied() {
        let settings = StoreSettings::parse("redis://localhost").unwrap();
        assert_eq!(settings.port, DEFAULT_STORE_PORT);
        assert_eq!(settings.database, 0);
        assert_eq!(settings.databases, DEFAULT_DATABASE_COUNT);
        assert_eq!(settings.pool_size, MIN_POOL_SIZE);
        assert_eq!(settings.max_idle, DEFAULT_MAX_IDLE);
        assert!(settings.password.is_none());
    }

    #[test]
    fn test_pool_size_minimum_enforced() {
        let settings = StoreSettings::parse("redis://localhost?pool_size=2").unwrap();
        assert_eq!(settings.pool_size, MIN_POOL_SIZE);
        assert_eq!(settings.pool_config().capacity, MIN_POOL_SIZE);
    }

    #[test]
    fn test_max_idle_capped_at_pool_size() {
        let settings = StoreSettings::parse("redis://localhost?max_idle=100").unwrap();
        assert_eq!(settings.max_idle, settings.pool_size);
    }

    #[test]
    fn test_memory_url() {
        let settings = StoreSettings::parse("memory:///2?databases=4").unwrap();
        assert_eq!(settings.scheme, StoreScheme::Memory);
        assert_eq!(settings.database, 2);
        assert_eq!(settings.databases, 4);
        assert_eq!(settings.address(), "memory");
        assert!(matches!(settings.connector(), Connector::Memory(_)));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(StoreSettings::parse("postgres://localhost/db").is_err());
        assert!(StoreSettings::parse("redis://localhost?writable=true").is_err());
        assert!(StoreSettings::parse("redis://localhost/abc").is_err());
        assert!(StoreSettings::parse("redis://localhost/20").is_err());
        assert!(StoreSettings::parse("redis://localhost?pool_size=lots").is_err());
        assert!(StoreSettings::parse("redis://localhost?timeout=0").is_err());
        assert!(StoreSettings::parse("not a url").is_err());
    }

    #[test]
    fn test_option_keys_case_insensitive() {
        let settings = StoreSettings::parse("redis://localhost?POOL_SIZE=20").unwrap();
        assert_eq!(settings.pool_size, 20);
    }

    #[test]
    fn test_transport_mode_display() {
        assert_eq!(TransportMode::Stdio.to_string(), "stdio");
        assert_eq!(TransportMode::Http.to_string(), "http");
    }
}
