//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use outbox_core::{validate_operation, NewOperation, OperationKey, PendingOperation};

use crate::error::Result;
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Last key handed out; keys are never reused.
    last_key: i64,

    /// Pending operations ordered by key.
    outbox: BTreeMap<OperationKey, PendingOperation>,

    /// Metadata values.
    meta: HashMap<String, String>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                last_key: 0,
                outbox: BTreeMap::new(),
                meta: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add(&self, op: &NewOperation) -> Result<OperationKey> {
        validate_operation(op)?;
        let mut inner = self.inner.write().unwrap();

        inner.last_key += 1;
        let key = OperationKey::new(inner.last_key);
        inner.outbox.insert(key, op.clone().into_pending(key));

        Ok(key)
    }

    async fn delete(&self, key: OperationKey) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.outbox.remove(&key);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.outbox.len() as u64)
    }

    async fn list_all(&self) -> Result<Vec<PendingOperation>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.outbox.values().cloned().collect())
    }

    async fn increment_tries(&self, key: OperationKey) -> Result<Option<u32>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.outbox.get_mut(&key).map(|op| {
            op.tries += 1;
            op.tries
        }))
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.meta.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
