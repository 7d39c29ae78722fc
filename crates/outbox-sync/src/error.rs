//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request could not be completed (network unreachable, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The operation's endpoint cannot be turned into a request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] outbox_store::StoreError),

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The drain this caller joined failed.
    #[error("drain failed: {0}")]
    DrainFailed(String),

    /// The drain this caller joined was dropped before finishing.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this failure means the remote was not reached.
    ///
    /// Any failed call halts a drain; transport-class ones are reported to
    /// observers as being offline.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Timeout(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
