//! # Outbox
//!
//! Offline resilience for API calls: a durable, ordered queue of operations
//! that could not be delivered, replayed automatically once the remote is
//! reachable again.
//!
//! ## Overview
//!
//! - **Enqueue**: an observer submits an operation; it is committed to the
//!   store before `enqueue` returns
//! - **Notify**: every observer hears the new pending count
//! - **Trigger**: a flush, a connectivity signal or the retry timer asks the
//!   scheduler for a drain
//! - **Drain**: pending operations are replayed oldest first; each completed
//!   response removes its operation, a transport failure stops the pass
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use outbox::{Outbox, OutboxConfig};
//! use outbox::core::{ParamValue, Parameters};
//! use outbox::store::SqliteStore;
//! use outbox::sync::{HttpRemote, HttpRemoteConfig};
//!
//! async fn example() {
//!     let store = SqliteStore::open("outbox.db").unwrap();
//!     let remote = HttpRemote::new(
//!         HttpRemoteConfig::default().with_base_url("https://school.example/".parse().unwrap()),
//!     )
//!     .unwrap();
//!
//!     let config = OutboxConfig::default().with_retry_interval(Duration::from_secs(60));
//!     let mut outbox = Outbox::new(store, remote, config);
//!     let scheduler = outbox.start();
//!
//!     let mut params = Parameters::new();
//!     params.insert("student".into(), ParamValue::from(17));
//!     outbox.enqueue("/api/attendance/mark", params).await.unwrap();
//!
//!     // Later, when the platform reports the network is back
//!     outbox.connectivity_restored().unwrap();
//!
//!     scheduler.shutdown().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `outbox::core` - Operation types
//! - `outbox::store` - Storage abstraction and SQLite
//! - `outbox::sync` - Drain engine, remotes and the notification bus

pub mod error;
pub mod queue;
pub mod scheduler;

// Re-export component crates
pub use outbox_core as core;
pub use outbox_store as store;
pub use outbox_sync as sync;

// Re-export main types for convenience
pub use error::{OutboxError, Result};
pub use queue::{Handled, Outbox, OutboxConfig};
pub use scheduler::{Scheduler, SchedulerConfig, Trigger, TriggerHandle};

// Re-export commonly used types
pub use outbox_core::{NewOperation, OperationKey, ParamValue, Parameters, PendingOperation};
pub use outbox_sync::{Event, ObserverRequest, Subscription, SyncConfig, SyncReport};
