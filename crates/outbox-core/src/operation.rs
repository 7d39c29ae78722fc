//! Pending operations: the buffered unit of work.
//!
//! An operation names a remote endpoint and a set of scalar parameters. It is
//! created on enqueue, read by every drain until it reaches a terminal outcome,
//! and then deleted. Apart from the retry counter it is never mutated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{now_millis, OperationKey, Timestamp};

/// A scalar parameter value, serialized into the outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Integer(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

/// Request parameters, keyed by name.
///
/// A `BTreeMap` keeps the encoded query string stable across replays.
pub type Parameters = BTreeMap<String, ParamValue>;

/// An operation that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOperation {
    /// Remote operation to invoke (URL or path).
    pub endpoint: String,
    /// Parameters applied as query parameters on replay.
    pub parameters: Parameters,
    /// Enqueue time (Unix ms).
    pub created_at: Timestamp,
}

impl NewOperation {
    /// Create an operation stamped with the current time.
    pub fn new(endpoint: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            endpoint: endpoint.into(),
            parameters,
            created_at: now_millis(),
        }
    }

    /// Override the enqueue timestamp.
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach the store-assigned key.
    pub fn into_pending(self, key: OperationKey) -> PendingOperation {
        PendingOperation {
            key,
            endpoint: self.endpoint,
            parameters: self.parameters,
            created_at: self.created_at,
            tries: 0,
        }
    }
}

/// An operation held in the outbox, awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Store-assigned key; defines replay order.
    pub key: OperationKey,
    /// Remote operation to invoke (URL or path).
    pub endpoint: String,
    /// Parameters applied as query parameters on replay.
    pub parameters: Parameters,
    /// Enqueue time (Unix ms). Set once.
    pub created_at: Timestamp,
    /// Number of drains that halted on this operation with a transport failure.
    pub tries: u32,
}

impl PendingOperation {
    /// Parameters rendered as `(name, value)` pairs for query encoding.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}
