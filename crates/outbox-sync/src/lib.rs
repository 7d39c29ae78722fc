//! # Outbox Sync
//!
//! Replays buffered operations against a remote endpoint and reports
//! progress to observers.
//!
//! ## Overview
//!
//! A drain reads every pending operation from the store, oldest first, and
//! replays them one at a time through a [`Remote`]. Each completed response
//! is terminal: the operation is deleted and counted. A transport failure
//! halts the drain and leaves the failed operation and everything after it
//! in place for the next attempt.
//!
//! ## Key Properties
//!
//! - **Ordered**: operation *i+1* is never sent before operation *i* resolves
//! - **Lossless**: nothing is deleted without a completed response
//! - **Single-flight**: a drain requested while one runs joins it
//! - **At-most-once events**: observers only see events sent while subscribed
//!
//! ## Usage
//!
//! ```rust,no_run
//! use outbox_store::SqliteStore;
//! use outbox_sync::{HttpRemote, HttpRemoteConfig, NotificationBus, SyncConfig, SyncEngine};
//!
//! async fn example() {
//!     let store = SqliteStore::open("outbox.db").unwrap();
//!     let remote = HttpRemote::new(HttpRemoteConfig::default()).unwrap();
//!     let bus = NotificationBus::new(64);
//!
//!     let mut events = bus.subscribe();
//!     let engine = SyncEngine::new(store, remote, bus, SyncConfig::default());
//!
//!     let report = engine.drain().await.unwrap();
//!     println!("delivered {} of {}", report.delivered, report.total);
//!     while let Some(event) = events.try_recv() {
//!         println!("{:?}", event);
//!     }
//! }
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! Engine                               Observers
//!   |-------- SyncProgress 0/N --------->|
//!   |-------- SyncProgress 1/N --------->|   (one per resolved operation)
//!   |              ...                   |
//!   |-------- QueueStatus -------------->|
//!   |-------- SyncDone ----------------->|
//! ```

pub mod bus;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod transport;

pub use bus::{NotificationBus, Subscription};
pub use error::{Result, SyncError};
pub use messages::{Event, ObserverRequest, INFO_NOTHING_TO_SYNC};
pub use protocol::{classify, Outcome, SyncConfig, SyncEngine, SyncReport};
pub use transport::{
    http::{HttpRemote, HttpRemoteConfig},
    memory::{MemoryRemote, Reply},
    Remote, RemoteResponse,
};
