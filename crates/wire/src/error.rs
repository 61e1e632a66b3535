//! Decode-time failures, kept distinct from the `ErrorCode` wire enum so the router can
//! choose `UNKNOWN_MESSAGE_TYPE` vs `VALIDATION_FAILED` without string-matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ProtocolError {
    pub fn code(&self) -> tether_core::ErrorCode {
        match self {
            ProtocolError::UnknownType(_) => tether_core::ErrorCode::UnknownMessageType,
            ProtocolError::Malformed(_) => tether_core::ErrorCode::ValidationFailed,
        }
    }
}
