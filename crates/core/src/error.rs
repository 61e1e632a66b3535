//! The closed set of error codes the wire protocol can carry.
//!
//! Every typed error in every crate maps to exactly one of these before it crosses the
//! wire — library errors never leak their `Display` text to a client unfiltered.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPath,
    ProjectNesting,
    ProjectNotFound,
    ProcessActive,
    ProcessNotActive,
    ExecutionTimeout,
    ExecutionFailed,
    ProcessKilled,
    AgentNotFound,
    ResourceLimit,
    UnknownMessageType,
    ValidationFailed,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", json.as_str().unwrap_or("UNKNOWN"))
    }
}
