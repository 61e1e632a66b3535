//! Errors internal to the connection layer itself (not the domain crates it wraps).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("maximum connection count reached")]
    ConnectionLimit,
    #[error("rate limit exceeded for this address")]
    RateLimited,
    #[error("origin not allowed")]
    OriginRejected,
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn code(&self) -> tether_core::ErrorCode {
        use tether_core::ErrorCode::*;
        match self {
            ServerError::ConnectionLimit | ServerError::RateLimited => ResourceLimit,
            ServerError::OriginRejected => ValidationFailed,
            ServerError::Ws(_) | ServerError::Io(_) => InternalError,
        }
    }
}
