//! Error types shared by every stowage backend.

use thiserror::Error;

use crate::meta::{ColumnType, StorageClass};

/// Raised while preparing an operation or validating metadata.
///
/// Validation errors are fatal: retrying the same input fails the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Table (or uri) name is empty.
    #[error("table name must not be empty")]
    EmptyTable,

    /// Raw SQL text is empty.
    #[error("query must not be empty")]
    EmptyQuery,

    /// Column declared with an empty name.
    #[error("column name must not be empty in table {table}")]
    EmptyColumnName { table: String },

    /// Table declared without columns.
    #[error("table {table} declares no columns")]
    NoColumns { table: String },

    /// Same column name declared twice.
    #[error("column {column} is declared more than once in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// No column is marked as key.
    #[error("table {table} has no key column")]
    MissingKey { table: String },

    /// `ignore_null` on a column that can never hold null.
    #[error("column {column} ignores null on serialize but is not nullable")]
    IgnoreNullOnPrimitive { column: String },

    /// Value does not belong to the column's storage classes.
    #[error("column {column} of type {expected:?} cannot hold a {actual:?} value")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        actual: StorageClass,
    },

    /// Null written to a non-nullable column.
    #[error("column {column} is not nullable")]
    NullInNonNullable { column: String },

    /// Value written to a column the table does not declare.
    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    /// Update issued with no values to set.
    #[error("values for update of table {table} must not be empty")]
    EmptyValues { table: String },

    /// Live query built without anything to observe.
    #[error("query observes no tables or tags: {query}")]
    NothingObserved { query: String },

    /// Two migrations share a version.
    #[error("migration version {version} is declared more than once")]
    DuplicateMigration { version: u32 },

    /// Builder finished without a required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Result type alias using ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Failure to run a blocking task on a scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The blocking task panicked.
    #[error("blocking task panicked: {0}")]
    Panicked(String),

    /// The runtime shut down before the task completed.
    #[error("blocking task was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            SchedulerError::Cancelled
        } else {
            SchedulerError::Panicked(err.to_string())
        }
    }
}
