//! Create a project, join it, run one execution, and confirm `project_list` reflects the
//! session id the execution produced.

use crate::support::{connect, recv, recv_n, send, spawn_stack, Behavior};
use serde_json::json;
use tether_core::ProjectId;
use tether_server::ServerConfig;
use tempfile::tempdir;

#[tokio::test]
async fn create_execute_list_round_trip() {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("s1");
    std::fs::create_dir_all(&project_dir).unwrap();

    let stack = spawn_stack(dir.path().to_path_buf(), ServerConfig::default()).await;
    let mut ws = connect(stack.addr).await;

    send(&mut ws, json!({"type": "project_create", "data": {"path": project_dir.to_string_lossy()}})).await;
    let created = recv(&mut ws).await;
    assert_eq!(created["type"], "project_state");
    assert_eq!(created["data"]["state"], "IDLE");
    assert!(created["data"]["session_id"].is_null());
    let project_id = created["project_id"].as_str().unwrap().to_string();

    send(&mut ws, json!({"type": "project_join", "data": {"project_id": project_id}})).await;
    let joined = recv(&mut ws).await;
    assert_eq!(joined["type"], "project_joined");

    stack.executor.set_behavior(
        ProjectId::from_string(project_id.clone()),
        Behavior::Complete {
            messages: vec![json!({"text": "hi there"})],
            session_id: Some("test-session-123".to_string()),
        },
    );
    send(&mut ws, json!({"type": "execute", "project_id": project_id, "data": {"prompt": "hi"}})).await;

    // The executing/idle transitions and the agent's reply are each broadcast from their
    // own task, so don't assume a fixed arrival order between them — just that all three
    // show up before anything else does.
    let frames = recv_n(&mut ws, 3).await;
    let executing = frames.iter().find(|f| f["type"] == "project_state" && f["data"]["state"] == "EXECUTING");
    assert!(executing.is_some(), "expected an EXECUTING project_state, got {frames:?}");
    let agent_message = frames.iter().find(|f| f["type"] == "agent_message");
    assert!(agent_message.is_some(), "expected an agent_message, got {frames:?}");
    let idle = frames
        .iter()
        .find(|f| f["type"] == "project_state" && f["data"]["state"] == "IDLE")
        .expect("expected an IDLE project_state");
    assert_eq!(idle["data"]["session_id"], "test-session-123");

    send(&mut ws, json!({"type": "project_list"})).await;
    let list = recv(&mut ws).await;
    assert_eq!(list["type"], "project_list");
    let entry = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == project_id)
        .expect("created project present in the list");
    assert_eq!(entry["session_id"], "test-session-123");

    stack.shutdown.cancel();
}
