//! Error types for the KV MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Caller mistakes (bad arguments, mismatched entry types) are detected locally before
//! any round trip; failures of the remote store surface unchanged as `Connection` or
//! `Remote`. Nothing in this crate retries.

use crate::store::EntryType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Type mismatch: '{name}' holds a {actual} entry, not a {expected}")]
    TypeMismatch {
        name: String,
        expected: EntryType,
        actual: EntryType,
    },

    #[error("Connection pool exhausted: no connection became available within {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Remote operation failed: {message}")]
    Remote { message: String },

    #[error("Object disposed: {object}")]
    Disposed { object: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KvError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a type mismatch error for a named entry.
    pub fn type_mismatch(name: impl Into<String>, expected: EntryType, actual: EntryType) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a remote error (error reply or malformed response).
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Create a disposed-object error.
    pub fn disposed(object: impl Into<String>) -> Self {
        Self::Disposed {
            object: object.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Increase pool_size or acquire_timeout in the store URL")
            }
            Self::TypeMismatch { .. } => {
                Some("Use the accessor matching the entry type reported by `get`")
            }
            _ => None,
        }
    }

    /// Check if this error came from the remote store (network or reply).
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Remote { .. })
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }
}

impl From<std::io::Error> for KvError {
    fn from(err: std::io::Error) -> Self {
        KvError::connection(
            format!("I/O error: {}", err),
            "Check network connectivity and store server status",
        )
    }
}

/// Result type alias for store operations.
pub type KvResult<T> = Result<T, KvError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert KvError to MCP ErrorData for semantic error categorization.
impl From<KvError> for rmcp::ErrorData {
    fn from(err: KvError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            KvError::InvalidArgument { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            KvError::TypeMismatch { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            KvError::PoolExhausted { .. }
            | KvError::PoolClosed
            | KvError::Connection { .. }
            | KvError::Remote { .. }
            | KvError::Disposed { .. }
            | KvError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
