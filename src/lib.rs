//! KV MCP Server Library
//!
//! This library provides a typed, connection-pooled facade over a
//! Redis-compatible key-value store, and exposes it to AI assistants as
//! MCP (Model Context Protocol) tools.

pub mod config;
pub mod entry;
pub mod error;
pub mod facade;
pub mod mcp;
pub mod pool;
pub mod probe;
pub mod registry;
pub mod sequence;
pub mod store;
pub mod subscriber;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{KvError, KvResult};
pub use facade::KvFacade;
pub use mcp::KvService;
