//! Error types for the outbox facade.

use outbox_core::ValidationError;
use outbox_store::StoreError;
use outbox_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during outbox operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The operation was malformed and never persisted.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence failed; nothing was committed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A drain failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The trigger surface is not running.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
