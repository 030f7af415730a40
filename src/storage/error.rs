//! Storage-specific error types.
//!
//! Relational operations return [`StorageError`]; time-series files return
//! [`TimeSeriesError`], whose `NotFound` variant drives create-or-update.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the relational storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Mutation queue is closed.
    #[error("failed to send mutation to queue")]
    ChannelSend,

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid data in database (e.g., unparsable template row).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Errors from the round-robin time-series store.
#[derive(Debug, Error)]
pub enum TimeSeriesError {
    /// Target file does not exist.
    #[error("time-series file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Target file already exists (create lost a race or ran twice).
    #[error("time-series file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Update timestamp is not after the last one.
    #[error("illegal update time {at}, last update was {last}")]
    StaleUpdate { at: i64, last: i64 },

    /// Value count or configuration does not match the file.
    #[error("invalid time-series operation: {0}")]
    Invalid(String),

    #[error("time-series io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("time-series file corrupt: {0}")]
    Format(#[from] serde_json::Error),
}
