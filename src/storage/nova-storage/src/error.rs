//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be opened or reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A read or write against the backend failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Caller supplied an unusable key or name.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
