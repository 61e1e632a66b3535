//! The unit of the per-project message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a logged message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Client,
    Agent,
}

/// One entry in a project's append-only log.
///
/// Invariant: within a single log file, entries are written in strictly non-decreasing
/// `timestamp` order (enforced by `tether-storage::MessageLog`, which is the only writer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedMessage {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub payload: serde_json::Value,
}

impl TimestampedMessage {
    pub fn new(timestamp: DateTime<Utc>, direction: Direction, payload: serde_json::Value) -> Self {
        Self { timestamp, direction, payload }
    }
}
