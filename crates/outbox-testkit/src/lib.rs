//! # Outbox Testkit
//!
//! Testing utilities for the offline outbox.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a drain engine wired to an in-memory store and a
//!   scriptable remote, a store that can be made to fail, plus helpers for
//!   building operations
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use outbox_testkit::generators::new_operation;
//!
//! proptest! {
//!     #[test]
//!     fn stored_parameters_round_trip(op in new_operation()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use outbox_testkit::fixtures::{make_op, TestFixture};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let fixture = TestFixture::new();
//! let engine = fixture.engine();
//! fixture.seed(&engine, &["a", "b"]).await;
//!
//! let report = engine.drain().await.unwrap();
//! assert_eq!(report.delivered, 2);
//! assert_eq!(fixture.sent_endpoints(), vec!["/api/a", "/api/b"]);
//! # });
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{make_op, make_params, wait_for_event, FlakyStore, TestFixture};
pub use generators::{new_operation, param_value, parameters};
