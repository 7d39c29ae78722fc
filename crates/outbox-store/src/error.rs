//! Error types for the store module.

use outbox_core::ValidationError;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Every variant is a persistence failure: the logical operation did not
/// commit and nothing partial is observable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Parameter serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation was rejected before being written.
    #[error("invalid operation: {0}")]
    Validation(#[from] ValidationError),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking worker running the transaction failed.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
