//! Inbound (client-to-server) envelope decoding.

use crate::types::ExecuteOptions;
use crate::ProtocolError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tether_core::ProjectId;

/// The literal wire shape: `{ "type": ..., "project_id": <optional>, "data": <optional> }`.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// A decoded client request, with `project_id` already resolved to whichever of the two
/// places this is allowed (an explicit field inside `data`, or the envelope-level
/// convenience field) the client actually used.
///
/// Resolving the *effective* target project (falling back further to the session's
/// currently-joined project) is the router's job, not this crate's — `tether-wire` only
/// reports what the client literally sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub project_id: Option<ProjectId>,
    pub kind: ClientMessageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessageKind {
    ProjectCreate { path: String },
    ProjectDelete,
    ProjectList,
    ProjectJoin,
    ProjectLeave,
    Execute { prompt: String, options: ExecuteOptions },
    AgentNewSession,
    AgentKill,
    GetMessages { since: DateTime<Utc> },
}

impl ClientMessageKind {
    /// The `type` string this kind decodes from / the unknown-type error names.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessageKind::ProjectCreate { .. } => "project_create",
            ClientMessageKind::ProjectDelete => "project_delete",
            ClientMessageKind::ProjectList => "project_list",
            ClientMessageKind::ProjectJoin => "project_join",
            ClientMessageKind::ProjectLeave => "project_leave",
            ClientMessageKind::Execute { .. } => "execute",
            ClientMessageKind::AgentNewSession => "agent_new_session",
            ClientMessageKind::AgentKill => "agent_kill",
            ClientMessageKind::GetMessages { .. } => "get_messages",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectCreateData {
    path: String,
}

#[derive(Debug, Deserialize)]
struct ProjectIdData {
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteData {
    prompt: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    options: ExecuteOptions,
}

#[derive(Debug, Deserialize)]
struct GetMessagesData {
    since: DateTime<Utc>,
    #[serde(default)]
    project_id: Option<String>,
}

/// Decode one inbound WebSocket text frame.
///
/// Errors are `ProtocolError::UnknownType` for an unrecognized `type`, or
/// `ProtocolError::Malformed` for anything else (bad JSON, missing required `data` fields).
pub fn decode(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let envelope: RawEnvelope =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let malformed = |e: serde_json::Error| ProtocolError::Malformed(e.to_string());
    // An absent `data` decodes to `Value::Null`; treat that as `{}` so types whose fields
    // are all optional (a bare project_id payload, say) don't require an empty object.
    let data = if envelope.data.is_null() { serde_json::json!({}) } else { envelope.data };

    let (kind, data_project_id) = match envelope.kind.as_str() {
        "project_create" => {
            let data: ProjectCreateData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::ProjectCreate { path: data.path }, None)
        }
        "project_delete" => {
            let data: ProjectIdData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::ProjectDelete, data.project_id)
        }
        "project_list" => (ClientMessageKind::ProjectList, None),
        "project_join" => {
            let data: ProjectIdData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::ProjectJoin, data.project_id)
        }
        "project_leave" => {
            let data: ProjectIdData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::ProjectLeave, data.project_id)
        }
        "execute" => {
            let data: ExecuteData = serde_json::from_value(data).map_err(malformed)?;
            (
                ClientMessageKind::Execute { prompt: data.prompt, options: data.options },
                data.project_id,
            )
        }
        "agent_new_session" => {
            let data: ProjectIdData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::AgentNewSession, data.project_id)
        }
        "agent_kill" => {
            let data: ProjectIdData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::AgentKill, data.project_id)
        }
        "get_messages" => {
            let data: GetMessagesData = serde_json::from_value(data).map_err(malformed)?;
            (ClientMessageKind::GetMessages { since: data.since }, data.project_id)
        }
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };

    let project_id = data_project_id
        .or(envelope.project_id)
        .map(ProjectId::from_string);

    Ok(ClientMessage { project_id, kind })
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
