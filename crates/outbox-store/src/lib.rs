//! # Outbox Store
//!
//! Durable storage for the offline outbox. Provides a trait-based interface
//! over two logical tables: the ordered outbox of pending operations and a
//! small metadata table.
//!
//! ## Overview
//!
//! The [`Store`] trait keeps the queue and the sync engine storage-agnostic.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! tests. A store handle is constructed explicitly and injected into its
//! users; dropping the last handle closes it.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`StoreExt`] - Typed helpers over the metadata table (`lastSync`)
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use outbox_core::{NewOperation, Parameters};
//! use outbox_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database (schema is created on first open)
//!     let store = SqliteStore::open("outbox.db").unwrap();
//!
//!     // Buffer an operation
//!     let op = NewOperation::new("/api/mark", Parameters::new());
//!     let key = store.add(&op).await.unwrap();
//!
//!     // Replay order is insertion order
//!     let pending = store.list_all().await.unwrap();
//!     assert_eq!(pending[0].key, key);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Monotonic keys**: keys are never reused, so key order is enqueue order
//! - **Idempotent deletes**: deleting a missing key is not an error
//! - **Last-write-wins metadata**: one value per metadata key

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreExt, LAST_SYNC_KEY};
