//! Demo error types.

use thiserror::Error;

/// Demo errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Coordinator error.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] livequery_core::Error),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A spawned task failed to complete.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The row does not exist.
    #[error("row {table}:{id} not found")]
    RowNotFound {
        /// Table name.
        table: String,
        /// Row id.
        id: u64,
    },
}
