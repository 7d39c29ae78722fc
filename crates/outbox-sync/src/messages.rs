//! Observer protocol message types.
//!
//! Observers send [`ObserverRequest`]s to the outbox and receive [`Event`]s
//! from it. Both serialize as JSON objects tagged by `type`, so they can be
//! carried over any message channel.

use serde::{Deserialize, Serialize};

use outbox_core::{Parameters, Timestamp};

use crate::error::{Result, SyncError};

/// `info` attached to the status sent when a drain finds nothing pending.
pub const INFO_NOTHING_TO_SYNC: &str = "nothing to sync";

/// Messages from an observer to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObserverRequest {
    /// Buffer an operation for delivery.
    Enqueue {
        endpoint: String,
        #[serde(default)]
        parameters: Parameters,
    },

    /// Ask for a fresh queue status broadcast.
    Status,

    /// Ask for a drain now.
    Flush,
}

impl ObserverRequest {
    /// Parse a request received as JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}

/// Messages from the outbox to every connected observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    /// Current queue state.
    #[serde(rename_all = "camelCase")]
    QueueStatus {
        /// Operations still waiting for delivery.
        pending: u64,
        /// Time of the most recent completed drain, if any.
        last_sync: Option<Timestamp>,
        /// Human-readable detail (e.g. "nothing to sync").
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<String>,
    },

    /// One more operation of the current drain has resolved.
    SyncProgress { done: u64, total: u64 },

    /// A drain attempt finished, fully or partially.
    SyncDone,
}

impl Event {
    /// Whether this is a queue status event.
    pub fn is_status(&self) -> bool {
        matches!(self, Event::QueueStatus { .. })
    }

    /// Whether this is a progress event.
    pub fn is_progress(&self) -> bool {
        matches!(self, Event::SyncProgress { .. })
    }

    /// Serialize for sending to an observer.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}
