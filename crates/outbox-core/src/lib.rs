//! # Outbox Core
//!
//! Pure primitives for the offline outbox: the buffered unit of work and the
//! values it carries.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`PendingOperation`] - A buffered call waiting to be replayed against a remote endpoint
//! - [`NewOperation`] - An operation before the store has assigned it a key
//! - [`OperationKey`] - Store-assigned, monotonically increasing identifier
//! - [`ParamValue`] / [`Parameters`] - Scalar request parameters
//!
//! ## Ordering
//!
//! Keys are assigned on insertion and only ever grow, so ordering by key is
//! ordering by enqueue time. Replay order is key order.

pub mod error;
pub mod operation;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use operation::{NewOperation, ParamValue, Parameters, PendingOperation};
pub use types::{now_millis, OperationKey, Timestamp};
pub use validation::validate_operation;
