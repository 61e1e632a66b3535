//! The typed JSON envelope exchanged over the WebSocket connection.
//!
//! Wire format: JSON text frames shaped `{ "type": <string>, "project_id": <string|absent>,
//! "data": <object|absent> }` in both directions.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod request;
mod response;
mod types;

pub use error::ProtocolError;
pub use request::{decode, ClientMessage, ClientMessageKind};
pub use response::ServerMessage;
pub use types::ExecuteOptions;
