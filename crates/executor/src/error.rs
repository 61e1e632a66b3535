use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("project already has an execution in progress")]
    ProcessActive,
    #[error("no execution is active for this project")]
    ProcessNotActive,
    #[error("project not found")]
    ProjectNotFound,
    #[error("maximum concurrent executions reached")]
    ResourceLimit,
    #[error("execution timed out")]
    ExecutionTimeout,
    #[error("execution failed: {message}")]
    ExecutionFailed { message: String, details: Option<serde_json::Value> },
    #[error("process was killed")]
    ProcessKilled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn code(&self) -> tether_core::ErrorCode {
        use tether_core::ErrorCode::*;
        match self {
            ExecutorError::ProcessActive => ProcessActive,
            ExecutorError::ProcessNotActive => ProcessNotActive,
            ExecutorError::ProjectNotFound => ProjectNotFound,
            ExecutorError::ResourceLimit => ResourceLimit,
            ExecutorError::ExecutionTimeout => ExecutionTimeout,
            ExecutorError::ExecutionFailed { .. } => ExecutionFailed,
            ExecutorError::ProcessKilled => ProcessKilled,
            ExecutorError::Io(_) => InternalError,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ExecutorError::ExecutionFailed { details, .. } => details.clone(),
            _ => None,
        }
    }
}
