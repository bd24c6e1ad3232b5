//! Core error types.

use thiserror::Error;

/// Boxed error produced by caller-supplied query and write callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A live query callable failed.
    #[error("query failed: {0}")]
    Query(#[source] BoxError),

    /// A write callable failed. Nothing was published.
    #[error("write failed: {0}")]
    Write(#[source] BoxError),

    /// The write executor returned without running the write body.
    #[error("write executor returned without running the write")]
    WriteSkipped,

    /// The completion signal was dropped before the execution finished,
    /// usually because a scheduler was stopped with the work still queued.
    #[error("execution was cancelled before completion")]
    Cancelled,

    /// IO error (worker thread spawn).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a query callable failure.
    pub fn query(err: impl Into<BoxError>) -> Self {
        Error::Query(err.into())
    }

    /// Wrap a write callable failure.
    pub fn write(err: impl Into<BoxError>) -> Self {
        Error::Write(err.into())
    }
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
