//! Dispatches one decoded client message to its handler.
//!
//! Every dispatch runs under three layers, innermost first: schema validation (did the
//! message carry what this handler needs), the handler itself, then panic recovery and
//! structured logging wrapping the whole call. A handler panicking never takes the
//! connection down with it — the router turns it into an `INTERNAL_ERROR` reply.

use crate::broadcast::Broadcaster;
use crate::connections::ConnectionTable;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tether_core::{ErrorCode, ProjectId, SessionId};
use tether_executor::AgentExecutor;
use tether_storage::{LogRegistry, ProjectRegistry};
use tether_wire::{ClientMessage, ClientMessageKind, ServerMessage};
use tracing::{debug, error, warn, Instrument};

pub struct ServerState {
    pub registry: Arc<ProjectRegistry>,
    pub logs: Arc<LogRegistry>,
    pub executor: Arc<dyn AgentExecutor>,
    pub connections: Arc<ConnectionTable>,
    pub broadcaster: Arc<Broadcaster>,
}

struct HandlerError {
    project_id: Option<ProjectId>,
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerError {
    fn validation(message: impl Into<String>) -> Self {
        Self { project_id: None, code: ErrorCode::ValidationFailed, message: message.into(), details: None }
    }
}

impl From<tether_storage::RegistryError> for HandlerError {
    fn from(e: tether_storage::RegistryError) -> Self {
        Self { project_id: None, code: e.code(), message: e.to_string(), details: None }
    }
}

impl From<tether_executor::ExecutorError> for HandlerError {
    fn from(e: tether_executor::ExecutorError) -> Self {
        let details = e.details();
        Self { project_id: None, code: e.code(), message: e.to_string(), details }
    }
}

impl From<tether_storage::LogError> for HandlerError {
    fn from(e: tether_storage::LogError) -> Self {
        Self { project_id: None, code: e.code(), message: e.to_string(), details: None }
    }
}

/// Entry point called once per inbound frame, spawned onto its own task by the
/// connection read loop so one slow handler never blocks the next message.
pub async fn dispatch(state: Arc<ServerState>, session_id: SessionId, message: ClientMessage) {
    let type_name = message.kind.type_name();
    let span = tracing::info_span!("router.dispatch", %session_id, r#type = type_name);
    async move {
        let start = std::time::Instant::now();
        let result = AssertUnwindSafe(handle(&state, &session_id, message)).catch_unwind().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => debug!(elapsed_ms, "handled"),
            Ok(Err(err)) => {
                warn!(elapsed_ms, code = %err.code, error = %err.message, "handler rejected message");
                let reply = match err.details {
                    Some(details) => {
                        ServerMessage::error_with_details(err.project_id, err.code, err.message, details)
                    }
                    None => ServerMessage::error(err.project_id, err.code, err.message),
                };
                send_to(&state.connections, &session_id, reply);
            }
            Err(_) => {
                error!(elapsed_ms, "handler panicked");
                send_to(
                    &state.connections,
                    &session_id,
                    ServerMessage::error(None, ErrorCode::InternalError, "internal error"),
                );
            }
        }
    }
    .instrument(span)
    .await
}

fn send_to(connections: &ConnectionTable, session_id: &SessionId, message: ServerMessage) {
    if let Some(handle) = connections.get(session_id) {
        if handle.sender.try_send(message).is_err() {
            warn!(%session_id, "dropped reply, session's outbound queue is full or closed");
        }
    }
}

/// Resolve the project a handler should act on: the explicit `project_id` the client
/// sent, falling back to whatever project the session currently has joined.
fn require_project_id(
    state: &ServerState,
    session_id: &SessionId,
    message: &ClientMessage,
) -> Result<ProjectId, HandlerError> {
    message
        .project_id
        .clone()
        .or_else(|| state.broadcaster.current_project(session_id))
        .ok_or_else(|| HandlerError::validation("project_id is required and no project is joined"))
}

async fn handle(
    state: &ServerState,
    session_id: &SessionId,
    message: ClientMessage,
) -> Result<(), HandlerError> {
    match message.kind {
        ClientMessageKind::ProjectCreate { path } => {
            if path.trim().is_empty() {
                return Err(HandlerError::validation("path must not be empty"));
            }
            let project = state.registry.create(PathBuf::from(path))?;
            send_to(&state.connections, session_id, ServerMessage::ProjectState(project));
            Ok(())
        }

        ClientMessageKind::ProjectDelete => {
            let project_id = require_project_id(state, session_id, &message)?;
            state.registry.delete(&project_id)?;
            state.logs.forget(&project_id);
            state
                .broadcaster
                .broadcast(&project_id, ServerMessage::ProjectDeleted { project_id: project_id.clone() })
                .await;
            state.broadcaster.drop_project(&project_id);
            Ok(())
        }

        ClientMessageKind::ProjectList => {
            let projects = state.registry.list();
            send_to(&state.connections, session_id, ServerMessage::ProjectList(projects));
            Ok(())
        }

        ClientMessageKind::ProjectJoin => {
            let project_id = message
                .project_id
                .clone()
                .ok_or_else(|| HandlerError::validation("project_id is required"))?;
            if state.registry.get(&project_id).is_none() {
                return Err(HandlerError {
                    project_id: Some(project_id),
                    code: ErrorCode::ProjectNotFound,
                    message: "project not found".into(),
                    details: None,
                });
            }
            state.broadcaster.subscribe(project_id.clone(), session_id.clone());
            send_to(&state.connections, session_id, ServerMessage::ProjectJoined { project_id });
            Ok(())
        }

        ClientMessageKind::ProjectLeave => {
            let project_id = require_project_id(state, session_id, &message)?;
            state.broadcaster.unsubscribe(&project_id, session_id);
            Ok(())
        }

        ClientMessageKind::Execute { prompt, options } => {
            if prompt.trim().is_empty() {
                return Err(HandlerError::validation("prompt must not be empty"));
            }
            let project_id = require_project_id(state, session_id, &message)?;
            let outcome = state
                .executor
                .execute(&project_id, prompt, options)
                .await
                .map_err(|e| {
                    let mut err: HandlerError = e.into();
                    err.project_id = Some(project_id.clone());
                    err
                })?;
            for agent_message in outcome.messages {
                state
                    .broadcaster
                    .broadcast(
                        &project_id,
                        ServerMessage::AgentMessage { project_id: project_id.clone(), message: agent_message },
                    )
                    .await;
            }
            Ok(())
        }

        ClientMessageKind::AgentNewSession => {
            let project_id = require_project_id(state, session_id, &message)?;
            state.registry.clear_session(&project_id)?;
            if let Some(project) = state.registry.get(&project_id) {
                send_to(&state.connections, session_id, ServerMessage::ProjectState(project));
            }
            Ok(())
        }

        ClientMessageKind::AgentKill => {
            let project_id = require_project_id(state, session_id, &message)?;
            state.executor.kill(&project_id).await.map_err(|e| {
                let mut err: HandlerError = e.into();
                err.project_id = Some(project_id.clone());
                err
            })?;
            Ok(())
        }

        ClientMessageKind::GetMessages { since } => {
            let project_id = require_project_id(state, session_id, &message)?;
            let messages = state.logs.messages_since(&project_id, since)?;
            send_to(
                &state.connections,
                session_id,
                ServerMessage::Messages { project_id, messages },
            );
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
