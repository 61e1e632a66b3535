//! The WebSocket-facing half of the system: accepts connections, decodes/dispatches
//! client messages, and fans out project state and agent output to subscribers.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod connections;
pub mod error;
pub mod rate_limit;
pub mod router;
pub mod stats;

pub use broadcast::Broadcaster;
pub use config::ServerConfig;
pub use connection::accept_loop;
pub use connections::ConnectionTable;
pub use error::ServerError;
pub use rate_limit::RateLimiter;
pub use router::ServerState;
