//! Outbound (server-to-client) envelope encoding.

use serde_json::{json, Value};
use tether_core::{ErrorCode, Project, ProjectId, TimestampedMessage};

/// A server-originated message. Every variant knows how to render itself into the
/// `{ "type", "project_id", "data" }` envelope shape, so handlers and the broadcaster
/// deal only in this enum and never hand-build JSON.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    ProjectState(Project),
    ProjectList(Vec<Project>),
    ProjectJoined { project_id: ProjectId },
    ProjectDeleted { project_id: ProjectId },
    AgentMessage { project_id: ProjectId, message: Value },
    Messages { project_id: ProjectId, messages: Vec<TimestampedMessage> },
    Error { project_id: Option<ProjectId>, code: ErrorCode, message: String, details: Option<Value> },
    Stats { active_connections: u64, active_projects: u64, executing_count: u64 },
    Pong,
}

impl ServerMessage {
    pub fn error(project_id: Option<ProjectId>, code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error { project_id, code, message: message.into(), details: None }
    }

    pub fn error_with_details(
        project_id: Option<ProjectId>,
        code: ErrorCode,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        ServerMessage::Error { project_id, code, message: message.into(), details: Some(details) }
    }

    /// Render the full `{ type, project_id, data }` envelope as a JSON value, ready for
    /// `to_string()` onto the wire.
    pub fn to_envelope(&self) -> Value {
        match self {
            ServerMessage::ProjectState(project) => json!({
                "type": "project_state",
                "project_id": project.id.as_str(),
                "data": project,
            }),
            ServerMessage::ProjectList(projects) => json!({
                "type": "project_list",
                "data": projects,
            }),
            ServerMessage::ProjectJoined { project_id } => json!({
                "type": "project_joined",
                "project_id": project_id.as_str(),
            }),
            ServerMessage::ProjectDeleted { project_id } => json!({
                "type": "project_deleted",
                "project_id": project_id.as_str(),
            }),
            ServerMessage::AgentMessage { project_id, message } => json!({
                "type": "agent_message",
                "project_id": project_id.as_str(),
                "data": message,
            }),
            ServerMessage::Messages { project_id, messages } => json!({
                "type": "messages",
                "project_id": project_id.as_str(),
                "data": messages,
            }),
            ServerMessage::Error { project_id, code, message, details } => {
                let mut data = json!({ "code": code, "message": message });
                if let Some(details) = details {
                    data["details"] = details.clone();
                }
                let mut envelope = json!({ "type": "error", "data": data });
                if let Some(project_id) = project_id {
                    envelope["project_id"] = json!(project_id.as_str());
                }
                envelope
            }
            ServerMessage::Stats { active_connections, active_projects, executing_count } => json!({
                "type": "stats",
                "data": {
                    "active_connections": active_connections,
                    "active_projects": active_projects,
                    "executing_count": executing_count,
                },
            }),
            ServerMessage::Pong => json!({ "type": "pong" }),
        }
    }

    /// Serialize straight to a WebSocket text payload.
    pub fn to_text(&self) -> String {
        self.to_envelope().to_string()
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
