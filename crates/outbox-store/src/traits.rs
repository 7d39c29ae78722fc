//! Store trait: the abstract interface for outbox persistence.
//!
//! This trait allows the queue and sync engine to be storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).

use std::sync::Arc;

use async_trait::async_trait;
use outbox_core::{NewOperation, OperationKey, PendingOperation, Timestamp};

use crate::error::Result;

/// Metadata key under which the last drain time is recorded.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// The Store trait: async interface for outbox persistence.
///
/// Every method is one transaction: it either fully commits or fails with
/// an error, never leaving a partial write behind. Implementations must
/// serialize mutations so concurrent callers cannot corrupt state.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Outbox Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist an operation and return its newly assigned key.
    ///
    /// Keys are strictly greater than every key previously assigned by this
    /// store, including keys of operations that have since been deleted.
    async fn add(&self, op: &NewOperation) -> Result<OperationKey>;

    /// Delete an operation by key.
    ///
    /// Deleting a key that is not present is a no-op.
    async fn delete(&self, key: OperationKey) -> Result<()>;

    /// Number of operations currently stored.
    async fn count(&self) -> Result<u64>;

    /// All stored operations, oldest first.
    async fn list_all(&self) -> Result<Vec<PendingOperation>>;

    /// Bump the retry counter of an operation.
    ///
    /// Returns the new counter, or `None` if the key is not present.
    async fn increment_tries(&self, key: OperationKey) -> Result<Option<u32>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a metadata value.
    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Set a metadata value, replacing any previous one.
    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn add(&self, op: &NewOperation) -> Result<OperationKey> {
        (**self).add(op).await
    }

    async fn delete(&self, key: OperationKey) -> Result<()> {
        (**self).delete(key).await
    }

    async fn count(&self) -> Result<u64> {
        (**self).count().await
    }

    async fn list_all(&self) -> Result<Vec<PendingOperation>> {
        (**self).list_all().await
    }

    async fn increment_tries(&self, key: OperationKey) -> Result<Option<u32>> {
        (**self).increment_tries(key).await
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        (**self).get_meta(key).await
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_meta(key, value).await
    }
}

/// Extension trait for typed metadata.
pub trait StoreExt: Store {
    /// Time of the most recent completed drain, if any.
    fn last_sync(&self) -> impl std::future::Future<Output = Result<Option<Timestamp>>> + Send;

    /// Record the time of a completed drain.
    fn record_sync(&self, at: Timestamp) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn last_sync(&self) -> Result<Option<Timestamp>> {
        // A value we cannot parse is treated as never synced
        Ok(self
            .get_meta(LAST_SYNC_KEY)
            .await?
            .and_then(|v| v.parse::<Timestamp>().ok()))
    }

    async fn record_sync(&self, at: Timestamp) -> Result<()> {
        self.set_meta(LAST_SYNC_KEY, &at.to_string()).await
    }
}
