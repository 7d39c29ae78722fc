//! Drain protocol: replay every pending operation in order.
//!
//! A drain reads the whole outbox, replays each operation through the
//! [`Remote`], deletes it once the remote has answered, and stops at the
//! first transport failure. Only one drain runs at a time per engine.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use outbox_core::{now_millis, PendingOperation, Timestamp};
use outbox_store::{Store, StoreExt};

use crate::bus::NotificationBus;
use crate::error::{Result, SyncError};
use crate::messages::{Event, INFO_NOTHING_TO_SYNC};
use crate::transport::{Remote, RemoteResponse};

/// How a completed response is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx with `{"ok": true}`.
    Applied,
    /// The remote reports the operation was applied earlier.
    AlreadyApplied,
    /// The remote answered but refused the operation. Terminal.
    Rejected,
}

impl Outcome {
    /// Whether the remote now holds the operation's effect.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::AlreadyApplied)
    }
}

/// Configuration for drain behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on a single remote call. Expiry is a transport failure.
    ///
    /// This is the timeout that applies by default; an HTTP remote only
    /// sets its own when `HttpRemoteConfig::timeout` is given.
    pub request_timeout: Duration,
    /// Body `code` values meaning "already applied".
    pub idempotent_codes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            idempotent_codes: vec!["already_marked".to_string()],
        }
    }
}

impl SyncConfig {
    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Treat `code` as an idempotent success as well.
    pub fn with_idempotent_code(mut self, code: impl Into<String>) -> Self {
        self.idempotent_codes.push(code.into());
        self
    }
}

/// Decide what a completed response means for its operation.
pub fn classify(response: &RemoteResponse, config: &SyncConfig) -> Outcome {
    let code = response.body.get("code").and_then(Value::as_str);
    if let Some(code) = code {
        if config.idempotent_codes.iter().any(|c| c == code) {
            return Outcome::AlreadyApplied;
        }
    }

    if response.is_success() && response.body.get("ok").and_then(Value::as_bool) == Some(true) {
        Outcome::Applied
    } else {
        Outcome::Rejected
    }
}

/// Result of a drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations pending when the drain started.
    pub total: u64,
    /// Operations the remote accepted (including idempotent repeats).
    pub delivered: u64,
    /// Operations the remote refused; deleted without retry.
    pub rejected: u64,
    /// Operations still pending when the drain finished.
    pub remaining: u64,
    /// Whether the drain stopped early on a transport failure.
    pub halted: bool,
    /// Whether this caller joined a drain that was already running.
    pub joined: bool,
    /// Time recorded as `lastSync` at the end of the drain.
    pub last_sync: Option<Timestamp>,
    /// Whether every pending operation was resolved.
    pub success: bool,
    /// Error message if the drain halted or failed.
    pub error: Option<String>,
}

impl SyncReport {
    /// Operations resolved by this drain (delivered or rejected).
    pub fn done(&self) -> u64 {
        self.delivered + self.rejected
    }
}

/// What happened to one operation.
enum Step {
    /// The remote answered.
    Resolved(Outcome),
    /// The request was never completed; stop the drain and keep the operation.
    Halt(SyncError),
}

/// What a leading drain hands to every caller that joined it.
type Published = Option<std::result::Result<SyncReport, String>>;

/// Lets one drain lead and every concurrent caller wait on its outcome.
type FlightSlot = Mutex<Option<watch::Receiver<Published>>>;

enum Flight {
    Lead(watch::Sender<Published>),
    Join(watch::Receiver<Published>),
}

/// Clears the in-flight slot when the leading drain ends or is dropped.
struct FlightGuard<'a> {
    slot: &'a FlightSlot,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// The drain engine.
///
/// Owns its store handle, remote and bus; the store is shared by wrapping
/// it in an `Arc` before handing it over.
pub struct SyncEngine<S: Store, R: Remote> {
    /// The outbox store.
    store: S,
    /// Where operations are replayed.
    remote: R,
    /// Observer fan-out.
    bus: NotificationBus,
    /// Configuration.
    config: SyncConfig,
    /// Report channel of the drain currently running, if any.
    in_flight: FlightSlot,
}

impl<S: Store, R: Remote> SyncEngine<S, R> {
    /// Create a new engine.
    pub fn new(store: S, remote: R, bus: NotificationBus, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            bus,
            config,
            in_flight: Mutex::new(None),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the remote reference.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Get the notification bus.
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether a drain is currently running.
    pub fn is_draining(&self) -> bool {
        self.in_flight
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Broadcast the current queue status and return it.
    pub async fn broadcast_status(&self, info: Option<String>) -> Result<Event> {
        let pending = self.store.count().await?;
        let last_sync = self.store.last_sync().await?;
        self.bus.broadcast_status(pending, last_sync, info.clone());
        Ok(Event::QueueStatus {
            pending,
            last_sync,
            info,
        })
    }

    /// Drain the outbox.
    ///
    /// If a drain is already running, waits for it and returns its outcome,
    /// with `joined` set on the report, instead of starting a second pass.
    ///
    /// A request that cannot be completed is not an error: it ends the drain
    /// early and is reported through `halted`. Errors are store failures
    /// ([`SyncError::DrainFailed`] for joiners of a failed drain), and
    /// [`SyncError::Cancelled`] for a joiner whose leader was dropped.
    pub async fn drain(&self) -> Result<SyncReport> {
        let flight = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(rx) => Flight::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Flight::Lead(tx)
                }
            }
        };

        match flight {
            Flight::Join(mut rx) => {
                tracing::debug!("drain already in flight, joining");
                let published = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| SyncError::Cancelled)?
                    .clone();
                match published {
                    Some(Ok(mut report)) => {
                        report.joined = true;
                        Ok(report)
                    }
                    Some(Err(message)) => Err(SyncError::DrainFailed(message)),
                    None => Err(SyncError::Cancelled),
                }
            }
            Flight::Lead(tx) => {
                let guard = FlightGuard {
                    slot: &self.in_flight,
                };
                let result = self.run_drain().await;

                let published = match &result {
                    Ok(report) => Ok(report.clone()),
                    Err(e) => Err(e.to_string()),
                };
                // Clear the slot first so a later caller starts a fresh drain
                drop(guard);
                let _ = tx.send(Some(published));
                result
            }
        }
    }

    async fn run_drain(&self) -> Result<SyncReport> {
        let ops = match self.store.list_all().await {
            Ok(ops) => ops,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read the outbox, drain abandoned");
                let e = SyncError::from(e);
                let mut report = SyncReport {
                    halted: true,
                    error: Some(e.to_string()),
                    ..SyncReport::default()
                };
                self.finish(&mut report, None, Some(&e)).await;
                return Err(e);
            }
        };
        let total = ops.len() as u64;
        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };

        if ops.is_empty() {
            let now = now_millis();
            self.store.record_sync(now).await?;
            self.bus
                .broadcast_status(0, Some(now), Some(INFO_NOTHING_TO_SYNC.to_string()));
            self.bus.broadcast_done();
            report.last_sync = Some(now);
            report.success = true;
            return Ok(report);
        }

        tracing::info!(total, "drain started");
        self.bus.broadcast_progress(0, total);

        let mut halt: Option<SyncError> = None;
        let mut failure: Option<SyncError> = None;
        for op in &ops {
            match self.replay(op).await {
                Step::Halt(e) => {
                    tracing::warn!(key = %op.key, endpoint = %op.endpoint, error = %e, "request not completed, halting drain");
                    report.halted = true;
                    report.error = Some(e.to_string());
                    if let Err(e) = self.store.increment_tries(op.key).await {
                        tracing::warn!(key = %op.key, error = %e, "failed to bump retry counter");
                    }
                    halt = Some(e);
                    break;
                }
                Step::Resolved(outcome) => {
                    if let Err(e) = self.store.delete(op.key).await {
                        let e = SyncError::from(e);
                        report.halted = true;
                        report.error = Some(e.to_string());
                        failure = Some(e);
                        break;
                    }
                    if outcome.is_delivered() {
                        report.delivered += 1;
                    } else {
                        report.rejected += 1;
                    }
                    self.bus.broadcast_progress(report.done(), total);
                }
            }
        }

        self.finish(&mut report, Some(total), halt.as_ref().or(failure.as_ref()))
            .await;
        tracing::info!(
            delivered = report.delivered,
            rejected = report.rejected,
            remaining = report.remaining,
            halted = report.halted,
            "drain finished"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Record `lastSync`, announce the final status and the end of the drain.
    ///
    /// Runs whether or not the loop finished; store failures here are logged
    /// so observers still hear that the drain ended. `listed` is the number
    /// of operations read at the start, if the outbox could be read at all.
    async fn finish(
        &self,
        report: &mut SyncReport,
        listed: Option<u64>,
        halt: Option<&SyncError>,
    ) {
        let now = now_millis();
        match self.store.record_sync(now).await {
            Ok(()) => report.last_sync = Some(now),
            Err(e) => tracing::warn!(error = %e, "failed to record lastSync"),
        }

        // Without a readable count, fall back to what this drain knows for sure
        let remaining = match self.store.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(error = %e, "cannot count pending operations");
                listed.map(|total| total - report.done())
            }
        };
        report.remaining = remaining.unwrap_or_default();
        report.success = !report.halted && report.remaining == 0;

        let info = match halt {
            Some(e) if e.is_transport() => Some(format!("offline: {} pending", report.remaining)),
            Some(e) => Some(format!("sync halted: {}; {} pending", e, report.remaining)),
            None if report.rejected > 0 => Some(format!("{} rejected", report.rejected)),
            None => None,
        };

        match remaining {
            Some(pending) => self.bus.broadcast_status(pending, report.last_sync, info),
            None => self.bus.broadcast_info(info.unwrap_or_default()),
        }
        self.bus.broadcast_done();
    }

    /// Replay one operation and classify the result.
    ///
    /// Only a completed response can resolve an operation. Any failure to
    /// build or complete the request halts the drain.
    async fn replay(&self, op: &PendingOperation) -> Step {
        let response =
            match tokio::time::timeout(self.config.request_timeout, self.remote.call(op)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Step::Halt(e),
                Err(_) => {
                    return Step::Halt(SyncError::Timeout(format!(
                        "no response from {} within {:?}",
                        op.endpoint, self.config.request_timeout
                    )))
                }
            };

        let outcome = classify(&response, &self.config);
        match outcome {
            Outcome::Rejected => tracing::warn!(
                key = %op.key,
                endpoint = %op.endpoint,
                status = response.status,
                body = %response.body,
                "operation rejected by remote, discarding"
            ),
            _ => tracing::debug!(key = %op.key, ?outcome, "operation delivered"),
        }
        Step::Resolved(outcome)
    }
}
