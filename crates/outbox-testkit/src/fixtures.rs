//! Test fixtures and helpers.
//!
//! Common setup code for engine and outbox tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outbox_core::{NewOperation, OperationKey, ParamValue, Parameters, PendingOperation};
use outbox_store::{MemoryStore, Store, StoreError};
use outbox_sync::{Event, MemoryRemote, NotificationBus, Subscription, SyncConfig, SyncEngine};

/// A shared scriptable remote plus the bus observers listen on.
pub struct TestFixture {
    pub remote: Arc<MemoryRemote>,
    pub bus: NotificationBus,
    pub config: SyncConfig,
}

impl TestFixture {
    /// A fixture whose remote accepts everything immediately.
    pub fn new() -> Self {
        Self::with_remote(MemoryRemote::new())
    }

    /// A fixture around a preconfigured remote.
    pub fn with_remote(remote: MemoryRemote) -> Self {
        Self {
            remote: Arc::new(remote),
            bus: NotificationBus::new(256),
            config: SyncConfig::default(),
        }
    }

    /// An engine over a fresh in-memory store.
    pub fn engine(&self) -> SyncEngine<MemoryStore, Arc<MemoryRemote>> {
        self.engine_with(MemoryStore::new())
    }

    /// An engine over the given store, sharing this fixture's remote and bus.
    pub fn engine_with<S: Store>(&self, store: S) -> SyncEngine<S, Arc<MemoryRemote>> {
        SyncEngine::new(store, self.remote.clone(), self.bus.clone(), self.config.clone())
    }

    /// Enqueue one operation per name, in order, directly into the engine's store.
    pub async fn seed<S: Store>(&self, engine: &SyncEngine<S, Arc<MemoryRemote>>, names: &[&str]) {
        for name in names {
            engine
                .store()
                .add(&make_op(name))
                .await
                .expect("seeding the store failed");
        }
    }

    /// Endpoints the remote has been called with, in call order.
    pub fn sent_endpoints(&self) -> Vec<String> {
        self.remote.calls().into_iter().map(|op| op.endpoint).collect()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory store that can be switched into failing every call.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail.
    pub fn break_down(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Make calls succeed again.
    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> outbox_store::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(StoreError::Task("disk unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn add(&self, op: &NewOperation) -> outbox_store::Result<OperationKey> {
        self.check()?;
        self.inner.add(op).await
    }

    async fn delete(&self, key: OperationKey) -> outbox_store::Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn count(&self) -> outbox_store::Result<u64> {
        self.check()?;
        self.inner.count().await
    }

    async fn list_all(&self) -> outbox_store::Result<Vec<PendingOperation>> {
        self.check()?;
        self.inner.list_all().await
    }

    async fn increment_tries(&self, key: OperationKey) -> outbox_store::Result<Option<u32>> {
        self.check()?;
        self.inner.increment_tries(key).await
    }

    async fn get_meta(&self, key: &str) -> outbox_store::Result<Option<String>> {
        self.check()?;
        self.inner.get_meta(key).await
    }

    async fn set_meta(&self, key: &str, value: &str) -> outbox_store::Result<()> {
        self.check()?;
        self.inner.set_meta(key, value).await
    }
}

/// An operation against `/api/{name}` carrying its name as a parameter.
pub fn make_op(name: &str) -> NewOperation {
    let mut params = Parameters::new();
    params.insert("name".into(), ParamValue::from(name));
    NewOperation::new(format!("/api/{}", name), params)
}

/// Parameters for marking one student present.
pub fn make_params(student: i64) -> Parameters {
    let mut params = Parameters::new();
    params.insert("student".into(), ParamValue::from(student));
    params.insert("status".into(), ParamValue::from("present"));
    params
}

/// Wait until an event matching `pred` arrives, or `timeout` passes.
pub async fn wait_for_event<F>(sub: &mut Subscription, pred: F, timeout: Duration) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = sub.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Every progress event in `events` as `(done, total)`.
pub fn progress_of(events: &[Event]) -> Vec<(u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::SyncProgress { done, total } => Some((*done, *total)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_sync::Reply;

    #[tokio::test]
    async fn test_fixture_drains_in_order() {
        let fixture = TestFixture::new();
        let engine = fixture.engine();
        let mut events = fixture.bus.subscribe();
        fixture.seed(&engine, &["a", "b", "c"]).await;

        engine.drain().await.unwrap();

        assert_eq!(fixture.sent_endpoints(), vec!["/api/a", "/api/b", "/api/c"]);
        assert_eq!(
            progress_of(&events.drain_pending()),
            vec![(0, 3), (1, 3), (2, 3), (3, 3)]
        );
    }

    #[tokio::test]
    async fn test_wait_for_event_times_out() {
        let fixture = TestFixture::with_remote(MemoryRemote::with_fallback(Reply::ok()));
        let mut events = fixture.bus.subscribe();
        let got = wait_for_event(&mut events, |_| true, Duration::from_millis(20)).await;
        assert!(got.is_none());
    }
}
