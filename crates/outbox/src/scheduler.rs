//! Trigger surface: the events that start a drain.
//!
//! Drains run on one dedicated worker task. Triggers (an explicit flush,
//! connectivity coming back, a periodic retry tick, a fresh enqueue) are
//! queued to that worker; a burst of triggers that arrives while a drain is
//! running is coalesced into a single follow-up drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use outbox_store::Store;
use outbox_sync::{Remote, SyncEngine};

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An observer asked for a flush.
    Flush,
    /// The network is reachable again.
    ConnectivityRestored,
    /// The periodic retry timer fired.
    Periodic,
    /// An operation was just enqueued.
    Enqueued,
}

#[derive(Debug)]
enum Command {
    Drain(Trigger),
    Shutdown,
}

/// Cheap, cloneable handle for requesting drains.
///
/// Requests are best-effort: they never fail, and report `false` only when
/// the worker has stopped.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Command>,
}

impl TriggerHandle {
    /// Request a drain.
    pub fn request(&self, trigger: Trigger) -> bool {
        match self.tx.try_send(Command::Drain(trigger)) {
            Ok(()) => true,
            // The queue already holds a drain request that will cover this one
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(?trigger, "scheduler stopped, drain request dropped");
                false
            }
        }
    }

    /// Request a drain on behalf of an observer.
    pub fn flush(&self) -> bool {
        self.request(Trigger::Flush)
    }

    /// Signal that connectivity has returned.
    pub fn connectivity_restored(&self) -> bool {
        self.request(Trigger::ConnectivityRestored)
    }

    /// Whether the worker is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Configuration for the trigger surface.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pending trigger slots; extra triggers are coalesced.
    pub capacity: usize,
    /// Period of the retry timer. `None` disables it.
    pub retry_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            retry_interval: None,
        }
    }
}

/// The running drain worker and its optional retry timer.
pub struct Scheduler {
    handle: TriggerHandle,
    worker: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the worker for `engine`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, R>(engine: Arc<SyncEngine<S, R>>, config: SchedulerConfig) -> Self
    where
        S: Store + 'static,
        R: Remote + 'static,
    {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let handle = TriggerHandle { tx };

        let worker = tokio::spawn(run_worker(engine, rx));
        let ticker = config
            .retry_interval
            .map(|period| tokio::spawn(run_ticker(handle.clone(), period)));

        Self {
            handle,
            worker,
            ticker,
        }
    }

    /// A handle for requesting drains.
    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }

    /// Stop the retry timer, let the current drain finish, and stop the worker.
    pub async fn shutdown(self) {
        if let Some(ticker) = self.ticker {
            ticker.abort();
        }
        // A full queue still drains; wait for room rather than dropping the request
        if self.handle.tx.send(Command::Shutdown).await.is_err() {
            tracing::debug!("scheduler already stopped");
        }
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "scheduler worker ended abnormally");
        }
    }
}

async fn run_worker<S, R>(engine: Arc<SyncEngine<S, R>>, mut rx: mpsc::Receiver<Command>)
where
    S: Store,
    R: Remote,
{
    while let Some(command) = rx.recv().await {
        let trigger = match command {
            Command::Drain(trigger) => trigger,
            Command::Shutdown => break,
        };

        // Everything queued so far is served by this one drain
        let mut shutdown = false;
        while let Ok(next) = rx.try_recv() {
            if matches!(next, Command::Shutdown) {
                shutdown = true;
            }
        }

        tracing::debug!(?trigger, "drain triggered");
        match engine.drain().await {
            Ok(report) => tracing::debug!(
                delivered = report.delivered,
                remaining = report.remaining,
                "triggered drain complete"
            ),
            Err(e) => tracing::warn!(error = %e, "triggered drain failed"),
        }

        if shutdown {
            break;
        }
    }
    tracing::debug!("scheduler worker stopped");
}

async fn run_ticker(handle: TriggerHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        if !handle.request(Trigger::Periodic) {
            break;
        }
    }
}
