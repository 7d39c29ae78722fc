//! Notification bus: fan-out of outbox events to connected observers.
//!
//! Delivery is at-most-once. An observer only receives events sent while
//! it is subscribed; there is no replay. Dropping a [`Subscription`]
//! unsubscribes it.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use outbox_core::Timestamp;

use crate::messages::Event;

/// Broadcasts queue status and drain progress to every subscriber.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Event>,
    /// Pending count and `lastSync` of the most recent status sent.
    last_status: Arc<Mutex<Option<(u64, Option<Timestamp>)>>>,
}

impl NotificationBus {
    /// Create a bus that buffers up to `capacity` events per slow observer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            last_status: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently connected observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Announce the current queue state.
    pub fn broadcast_status(&self, pending: u64, last_sync: Option<Timestamp>, info: Option<String>) {
        *self.lock_status() = Some((pending, last_sync));
        self.send(Event::QueueStatus {
            pending,
            last_sync,
            info,
        });
    }

    /// Announce `info` alongside the last status sent, when the current
    /// queue state cannot be read.
    ///
    /// Nothing is sent if no status has been sent yet; a pending count is
    /// never made up.
    pub fn broadcast_info(&self, info: String) {
        let last = *self.lock_status();
        match last {
            Some((pending, last_sync)) => self.send(Event::QueueStatus {
                pending,
                last_sync,
                info: Some(info),
            }),
            None => tracing::warn!(%info, "no known queue status, info not broadcast"),
        }
    }

    /// The pending count and `lastSync` of the most recent status sent.
    pub fn last_status(&self) -> Option<(u64, Option<Timestamp>)> {
        *self.lock_status()
    }

    /// Announce that `done` of `total` operations have resolved.
    pub fn broadcast_progress(&self, done: u64, total: u64) {
        self.send(Event::SyncProgress { done, total });
    }

    /// Announce the end of a drain attempt.
    pub fn broadcast_done(&self) {
        self.send(Event::SyncDone);
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Option<(u64, Option<Timestamp>)>> {
        self.last_status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, event: Event) {
        // Err only means nobody is listening
        if self.tx.send(event).is_err() {
            tracing::trace!("no observers connected, event dropped");
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One observer's view of the bus.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Wait for the next event.
    ///
    /// Returns `None` once the bus is gone. Events missed because this
    /// observer fell behind are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "observer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "observer lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Take every event already waiting.
    pub fn drain_pending(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
