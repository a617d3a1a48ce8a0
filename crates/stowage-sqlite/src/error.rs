//! Store error types.

use std::error::Error as StdError;

use stowage_common::{SchedulerError, ValidationError};
use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StowageError {
    /// Invalid query, metadata or builder input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No type mapping registered for the type or any declared ancestor
    #[error("Type mapping not found for {0}; register one or pass an explicit resolver")]
    MappingNotFound(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Row or value that cannot be mapped
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Transaction call out of sequence
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Blocking task failed to run
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Error raised by a user supplied resolver
    #[error("Resolver error: {0}")]
    Resolver(Box<dyn StdError + Send + Sync>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure of a prepared operation, carrying the input it was given
    #[error("Error has occurred during {operation} operation. {data}")]
    Operation {
        operation: &'static str,
        data: String,
        #[source]
        source: Box<StowageError>,
    },
}

impl StowageError {
    /// Wraps a user error raised inside a resolver.
    pub fn resolver(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        StowageError::Resolver(err.into())
    }

    /// Wraps `self` at an operation boundary.
    ///
    /// Already wrapped errors pass through so nested operations (a batch
    /// calling per-object resolvers) do not stack wrappers.
    pub(crate) fn in_operation(self, operation: &'static str, data: impl FnOnce() -> String) -> Self {
        match self {
            wrapped @ StowageError::Operation { .. } => wrapped,
            other => StowageError::Operation {
                operation,
                data: data(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping operation wrappers.
    pub fn root_cause(&self) -> &StowageError {
        match self {
            StowageError::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias using StowageError.
pub type StowageResult<T> = Result<T, StowageError>;
