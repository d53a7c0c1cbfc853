//! Remote store primitives.
//!
//! This module provides the primitive command layer the pooled facade sits on:
//! - RESP2 framing (`resp`)
//! - A TCP backend speaking RESP2 to a Redis-compatible server (`tcp`)
//! - An in-process backend with the same command subset (`memory`)
//! - Typed command helpers shared by every caller (`commands`)

pub mod commands;
pub mod memory;
pub mod resp;
pub mod tcp;

pub use commands::{Command, SetCondition, SetOperation};
pub use memory::MemoryStore;
pub use resp::RespValue;
pub use tcp::TcpConnection;

use crate::error::{KvError, KvResult};
use memory::MemoryConnection;
use schemars::JsonSchema;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// The closed set of value shapes a key can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    None,
    Scalar,
    Dictionary,
    List,
    Set,
    SortedSet,
}

impl EntryType {
    /// Map the store's `TYPE` reply onto an entry type.
    pub fn from_type_name(name: &str) -> KvResult<Self> {
        match name {
            "none" => Ok(EntryType::None),
            "string" => Ok(EntryType::Scalar),
            "hash" => Ok(EntryType::Dictionary),
            "list" => Ok(EntryType::List),
            "set" => Ok(EntryType::Set),
            "zset" => Ok(EntryType::SortedSet),
            other => Err(KvError::remote(format!("Unsupported entry type '{}'", other))),
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::None => write!(f, "none"),
            EntryType::Scalar => write!(f, "scalar"),
            EntryType::Dictionary => write!(f, "dictionary"),
            EntryType::List => write!(f, "list"),
            EntryType::Set => write!(f, "set"),
            EntryType::SortedSet => write!(f, "sorted set"),
        }
    }
}

enum Backend {
    Tcp(TcpConnection),
    Memory(MemoryConnection),
}

/// A single connection to the store.
///
/// Tracks the logical database it currently targets and whether a transport
/// failure has left it in an unknown state.
pub struct Connection {
    backend: Backend,
    database: u32,
    broken: bool,
}

impl Connection {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            database: 0,
            broken: false,
        }
    }

    /// Send one command and read its reply.
    ///
    /// Error replies come back as `RespValue::Error`; only transport and framing
    /// failures are returned as `Err`, and those mark the connection broken.
    ///
    /// The connection counts as broken while a reply is outstanding, so a
    /// caller dropped mid round trip leaves it for the pool to discard.
    pub async fn execute(&mut self, command: &Command) -> KvResult<RespValue> {
        let was_broken = std::mem::replace(&mut self.broken, true);
        let result = match &mut self.backend {
            Backend::Tcp(conn) => conn.execute(command.args_slice()).await,
            Backend::Memory(conn) => Ok(conn.execute(self.database, command.args_slice())),
        };

        match &result {
            Ok(_) => self.broken = was_broken,
            Err(e) => debug!(command = %command.name(), error = %e, "Connection marked broken"),
        }
        result
    }

    /// Switch to another logical database if not already there.
    pub async fn select(&mut self, database: u32) -> KvResult<()> {
        if self.database == database {
            return Ok(());
        }
        if let Backend::Tcp(_) = self.backend {
            self.execute(&Command::new("SELECT").arg(database))
                .await?
                .into_ok()?;
        }
        self.database = database;
        Ok(())
    }

    /// The logical database this connection currently targets.
    pub fn database(&self) -> u32 {
        self.database
    }

    /// Whether a transport failure happened on this connection.
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Tcp(_) => "tcp",
            Backend::Memory(_) => "memory",
        };
        f.debug_struct("Connection")
            .field("backend", &backend)
            .field("database", &self.database)
            .field("broken", &self.broken)
            .finish()
    }
}

/// Factory for new store connections, handed to the pool at construction.
#[derive(Debug, Clone)]
pub enum Connector {
    /// RESP2 over TCP to a Redis-compatible server.
    Tcp {
        address: String,
        password: Option<String>,
        client_name: Option<String>,
        timeout: Duration,
    },
    /// In-process store shared by every connection.
    Memory(MemoryStore),
}

impl Connector {
    /// Open a new connection.
    pub async fn connect(&self) -> KvResult<Connection> {
        match self {
            Connector::Tcp {
                address,
                password,
                client_name,
                timeout,
            } => {
                let conn = TcpConnection::connect(
                    address,
                    password.as_deref(),
                    client_name.as_deref(),
                    *timeout,
                )
                .await?;
                Ok(Connection::new(Backend::Tcp(conn)))
            }
            Connector::Memory(store) => Ok(Connection::new(Backend::Memory(store.connect()))),
        }
    }

    /// Human-readable address of the store.
    pub fn address(&self) -> &str {
        match self {
            Connector::Tcp { address, .. } => address,
            Connector::Memory(_) => "memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_type_name() {
        assert_eq!(EntryType::from_type_name("hash").unwrap(), EntryType::Dictionary);
        assert_eq!(EntryType::from_type_name("string").unwrap(), EntryType::Scalar);
        assert_eq!(EntryType::from_type_name("zset").unwrap(), EntryType::SortedSet);
        assert_eq!(EntryType::from_type_name("none").unwrap(), EntryType::None);
        assert!(EntryType::from_type_name("stream").is_err());
    }

    #[tokio::test]
    async fn test_memory_connection_select_is_local() {
        let connector = Connector::Memory(MemoryStore::new());
        let mut conn = connector.connect().await.unwrap();
        assert_eq!(conn.database(), 0);
        conn.select(3).await.unwrap();
        assert_eq!(conn.database(), 3);
        assert!(!conn.is_broken());
    }
}
