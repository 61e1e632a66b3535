#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod command;
pub mod error;
pub mod parse;
pub mod process;

pub use error::ExecutorError;
pub use process::{
    AgentExecutor, ExecutionOutcome, ExecutorConfig, NullNotifier, ProcessExecutor, StateNotifier,
};
