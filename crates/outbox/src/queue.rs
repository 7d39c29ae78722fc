//! The Outbox: the queue contract observers talk to.
//!
//! Brings together the store, the drain engine and the trigger surface.
//! Enqueued operations are durable before `enqueue` returns; delivery
//! happens later, on whichever drain picks them up.

use std::sync::Arc;
use std::time::Duration;

use outbox_core::{
    validate_operation, NewOperation, OperationKey, Parameters, PendingOperation, Timestamp,
};
use outbox_store::{Store, StoreExt};
use outbox_sync::{
    Event, NotificationBus, ObserverRequest, Remote, Subscription, SyncConfig, SyncEngine,
    SyncReport,
};

use crate::error::{OutboxError, Result};
use crate::scheduler::{Scheduler, SchedulerConfig, Trigger, TriggerHandle};

/// Configuration for the Outbox.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Drain configuration.
    pub sync: SyncConfig,
    /// Events buffered per slow observer before it starts missing some.
    pub bus_capacity: usize,
    /// Pending trigger slots on the drain worker.
    pub trigger_capacity: usize,
    /// Period of the automatic retry timer. `None` disables it.
    pub retry_interval: Option<Duration>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            bus_capacity: 64,
            trigger_capacity: 16,
            retry_interval: None,
        }
    }
}

impl OutboxConfig {
    /// Retry pending operations every `period` while the scheduler runs.
    pub fn with_retry_interval(mut self, period: Duration) -> Self {
        self.retry_interval = Some(period);
        self
    }

    /// Replace the drain configuration.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// What the outbox did with an observer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The operation is durably queued under this key.
    Enqueued(OperationKey),
    /// The status that was broadcast.
    Status(Event),
    /// A drain was handed to the scheduler.
    FlushScheduled,
    /// A drain ran inline (no scheduler attached).
    Flushed(SyncReport),
}

/// The main Outbox struct.
///
/// Provides:
/// - Enqueueing operations durably
/// - Inspecting and removing pending operations
/// - Status broadcasts to observers
/// - Draining, either inline or through the scheduler
pub struct Outbox<S: Store, R: Remote> {
    /// The drain engine, which also owns the store handle.
    engine: Arc<SyncEngine<S, R>>,
    /// Configuration.
    config: OutboxConfig,
    /// Trigger surface, once started.
    triggers: Option<TriggerHandle>,
}

impl<S: Store, R: Remote> Outbox<S, R> {
    /// Create a new outbox over an opened store.
    pub fn new(store: S, remote: R, config: OutboxConfig) -> Self {
        let bus = NotificationBus::new(config.bus_capacity);
        let engine = SyncEngine::new(store, remote, bus, config.sync.clone());
        Self {
            engine: Arc::new(engine),
            config,
            triggers: None,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        self.engine.store()
    }

    /// Get the drain engine.
    pub fn engine(&self) -> &Arc<SyncEngine<S, R>> {
        &self.engine
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Subscription {
        self.engine.bus().subscribe()
    }

    /// Attach an already running trigger surface.
    pub fn attach(&mut self, triggers: TriggerHandle) {
        self.triggers = Some(triggers);
    }

    /// The attached trigger surface, if any.
    pub fn triggers(&self) -> Option<&TriggerHandle> {
        self.triggers.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Durably queue an operation.
    ///
    /// Returns once the operation is committed. Then broadcasts the new
    /// pending count and asks the scheduler for a drain; neither of those
    /// can fail the enqueue. A failed write is reported to observers and
    /// returned.
    pub async fn enqueue(
        &self,
        endpoint: impl Into<String>,
        parameters: Parameters,
    ) -> Result<OperationKey> {
        let op = NewOperation::new(endpoint, parameters);

        let added = match validate_operation(&op) {
            Ok(()) => self.store().add(&op).await.map_err(OutboxError::from),
            Err(e) => Err(OutboxError::from(e)),
        };

        let key = match added {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(endpoint = %op.endpoint, error = %e, "enqueue failed");
                let info = format!("enqueue failed: {}", e);
                if self.engine.broadcast_status(Some(info.clone())).await.is_err() {
                    // The queue cannot be read; repeat the last count rather than guess
                    self.engine.bus().broadcast_info(info);
                }
                return Err(e);
            }
        };

        tracing::debug!(%key, endpoint = %op.endpoint, "operation enqueued");
        if let Err(e) = self.engine.broadcast_status(None).await {
            tracing::warn!(error = %e, "status broadcast after enqueue failed");
        }
        self.request_drain(Trigger::Enqueued);

        Ok(key)
    }

    /// Every pending operation, oldest first.
    pub async fn all(&self) -> Result<Vec<PendingOperation>> {
        Ok(self.store().list_all().await?)
    }

    /// Remove a pending operation. Removing a missing key is a no-op.
    pub async fn remove(&self, key: OperationKey) -> Result<()> {
        let before = self.store().count().await?;
        self.store().delete(key).await?;
        if self.store().count().await? != before {
            self.engine.broadcast_status(None).await?;
        }
        Ok(())
    }

    /// Number of operations waiting for delivery.
    pub async fn pending_count(&self) -> Result<u64> {
        Ok(self.store().count().await?)
    }

    /// Time of the most recent completed drain.
    pub async fn last_sync(&self) -> Result<Option<Timestamp>> {
        Ok(self.store().last_sync().await?)
    }

    /// Broadcast the current status and return it.
    pub async fn status(&self) -> Result<Event> {
        Ok(self.engine.broadcast_status(None).await?)
    }

    /// Drain now and wait for the result.
    ///
    /// Joins a drain that is already running instead of starting another.
    pub async fn flush(&self) -> Result<SyncReport> {
        Ok(self.engine.drain().await?)
    }

    /// Ask the scheduler for a drain without waiting for it.
    pub fn request_flush(&self) -> Result<()> {
        self.trigger(Trigger::Flush)
    }

    /// Tell the scheduler the network is reachable again.
    pub fn connectivity_restored(&self) -> Result<()> {
        self.trigger(Trigger::ConnectivityRestored)
    }

    /// Dispatch a request from an observer.
    ///
    /// A flush is handed to the scheduler when one is attached, and run
    /// inline otherwise.
    pub async fn handle(&self, request: ObserverRequest) -> Result<Handled> {
        match request {
            ObserverRequest::Enqueue {
                endpoint,
                parameters,
            } => Ok(Handled::Enqueued(self.enqueue(endpoint, parameters).await?)),
            ObserverRequest::Status => Ok(Handled::Status(self.status().await?)),
            ObserverRequest::Flush => match &self.triggers {
                Some(triggers) if triggers.flush() => Ok(Handled::FlushScheduled),
                _ => Ok(Handled::Flushed(self.flush().await?)),
            },
        }
    }

    fn trigger(&self, trigger: Trigger) -> Result<()> {
        match &self.triggers {
            Some(triggers) if triggers.request(trigger) => Ok(()),
            Some(_) => Err(OutboxError::Scheduler("scheduler has stopped".into())),
            None => Err(OutboxError::Scheduler("scheduler not started".into())),
        }
    }

    fn request_drain(&self, trigger: Trigger) {
        match &self.triggers {
            Some(triggers) => {
                triggers.request(trigger);
            }
            None => tracing::debug!(?trigger, "no scheduler attached, drain deferred to next flush"),
        }
    }
}

impl<S, R> Outbox<S, R>
where
    S: Store + 'static,
    R: Remote + 'static,
{
    /// Start the trigger surface for this outbox and attach it.
    ///
    /// Must be called from within a tokio runtime. The returned scheduler
    /// keeps running until [`Scheduler::shutdown`].
    pub fn start(&mut self) -> Scheduler {
        let scheduler = Scheduler::spawn(
            self.engine.clone(),
            SchedulerConfig {
                capacity: self.config.trigger_capacity,
                retry_interval: self.config.retry_interval,
            },
        );
        self.attach(scheduler.handle());
        scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_store::MemoryStore;
    use outbox_sync::{MemoryRemote, Reply};
    use outbox_testkit::fixtures::{make_params, wait_for_event, FlakyStore};

    fn outbox(remote: MemoryRemote) -> Outbox<MemoryStore, MemoryRemote> {
        Outbox::new(MemoryStore::new(), remote, OutboxConfig::default())
    }

    #[tokio::test]
    async fn test_enqueue_broadcasts_pending_count() {
        let outbox = outbox(MemoryRemote::new());
        let mut events = outbox.subscribe();

        outbox.enqueue("/api/mark", make_params(1)).await.unwrap();
        outbox.enqueue("/api/mark", make_params(2)).await.unwrap();

        let pending: Vec<u64> = events
            .drain_pending()
            .into_iter()
            .filter_map(|e| match e {
                Event::QueueStatus { pending, .. } => Some(pending),
                _ => None,
            })
            .collect();
        assert_eq!(pending, vec![1, 2]);
        assert_eq!(outbox.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_without_scheduler_does_not_send() {
        let outbox = outbox(MemoryRemote::new());
        outbox.enqueue("/api/mark", make_params(1)).await.unwrap();
        assert_eq!(outbox.engine().remote().call_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported() {
        let outbox = outbox(MemoryRemote::new());
        let mut events = outbox.subscribe();

        let result = outbox.enqueue("", Parameters::new()).await;
        assert!(result.is_err());

        let status = events.try_recv().unwrap();
        assert!(matches!(
            status,
            Event::QueueStatus { pending: 0, info: Some(info), .. } if info.starts_with("enqueue failed")
        ));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let outbox = outbox(MemoryRemote::new());
        let key = outbox.enqueue("/api/mark", make_params(1)).await.unwrap();
        outbox.enqueue("/api/mark", make_params(2)).await.unwrap();

        outbox.remove(key).await.unwrap();
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
        outbox.remove(key).await.unwrap();
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_handle_requests_inline() {
        let outbox = outbox(MemoryRemote::new());

        let handled = outbox
            .handle(ObserverRequest::Enqueue {
                endpoint: "/api/mark".into(),
                parameters: make_params(3),
            })
            .await
            .unwrap();
        assert!(matches!(handled, Handled::Enqueued(_)));

        let handled = outbox.handle(ObserverRequest::Status).await.unwrap();
        assert!(matches!(handled, Handled::Status(Event::QueueStatus { pending: 1, .. })));

        let handled = outbox.handle(ObserverRequest::Flush).await.unwrap();
        match handled {
            Handled::Flushed(report) => assert_eq!(report.delivered, 1),
            other => panic!("expected inline flush, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_started_outbox_drains_after_enqueue() {
        let mut outbox = outbox(MemoryRemote::new());
        let scheduler = outbox.start();
        let mut events = outbox.subscribe();

        outbox.enqueue("/api/mark", make_params(1)).await.unwrap();

        assert!(wait_for_event(&mut events, |e| *e == Event::SyncDone, Duration::from_secs(2))
            .await
            .is_some());
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
        assert!(outbox.last_sync().await.unwrap().is_some());

        assert_eq!(
            outbox.handle(ObserverRequest::Flush).await.unwrap(),
            Handled::FlushScheduled
        );
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_trigger_requests_need_scheduler() {
        let mut outbox = outbox(MemoryRemote::new());
        assert!(matches!(
            outbox.connectivity_restored(),
            Err(OutboxError::Scheduler(_))
        ));

        let scheduler = outbox.start();
        outbox.request_flush().unwrap();
        outbox.connectivity_restored().unwrap();
        scheduler.shutdown().await;

        assert!(matches!(outbox.request_flush(), Err(OutboxError::Scheduler(_))));
    }

    #[tokio::test]
    async fn test_offline_enqueue_is_kept() {
        let mut outbox = outbox(MemoryRemote::with_fallback(Reply::unreachable()));
        let scheduler = outbox.start();
        let mut events = outbox.subscribe();

        outbox.enqueue("/api/mark", make_params(1)).await.unwrap();

        let status = wait_for_event(
            &mut events,
            |e| matches!(e, Event::QueueStatus { info: Some(_), .. }),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(
            status,
            Event::QueueStatus {
                pending: 1,
                last_sync: outbox.last_sync().await.unwrap(),
                info: Some("offline: 1 pending".into()),
            }
        );
        assert_eq!(outbox.all().await.unwrap()[0].tries, 1);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_failure_keeps_last_known_count() {
        let outbox = Outbox::new(
            Arc::new(FlakyStore::new()),
            MemoryRemote::new(),
            OutboxConfig::default(),
        );
        let mut events = outbox.subscribe();
        outbox.enqueue("/api/mark", make_params(1)).await.unwrap();
        events.drain_pending();

        outbox.store().break_down();
        let err = outbox.enqueue("/api/mark", make_params(2)).await.unwrap_err();
        assert!(matches!(err, OutboxError::Store(_)));

        let status = events.try_recv().unwrap();
        assert!(matches!(
            status,
            Event::QueueStatus { pending: 1, last_sync: None, info: Some(ref info), .. }
                if info.starts_with("enqueue failed")
        ));

        outbox.store().repair();
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
    }
}
