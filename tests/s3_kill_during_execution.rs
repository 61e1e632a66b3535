//! Killing a running execution reports `PROCESS_KILLED`, returns the project to `IDLE`, and
//! leaves it usable for a subsequent execution.

use crate::support::{connect, recv, send, spawn_stack, Behavior};
use serde_json::json;
use tether_core::ProjectId;
use tether_server::ServerConfig;
use tempfile::tempdir;
use tokio::time::{timeout, Duration};

#[tokio::test]
async fn killing_a_hung_execution_reverts_to_idle_and_allows_reexecution() {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("s3");
    std::fs::create_dir_all(&project_dir).unwrap();

    let stack = spawn_stack(dir.path().to_path_buf(), ServerConfig::default()).await;
    let mut ws = connect(stack.addr).await;

    send(&mut ws, json!({"type": "project_create", "data": {"path": project_dir.to_string_lossy()}})).await;
    let created = recv(&mut ws).await;
    let project_id = created["project_id"].as_str().unwrap().to_string();
    let pid = ProjectId::from_string(project_id.clone());

    send(&mut ws, json!({"type": "project_join", "data": {"project_id": project_id}})).await;
    let _joined = recv(&mut ws).await;

    stack.executor.set_behavior(pid.clone(), Behavior::HangUntilKilled);
    send(&mut ws, json!({"type": "execute", "project_id": project_id, "data": {"prompt": "hang"}})).await;

    // Wait for the executing transition to land in the registry before killing, since dispatch
    // runs on its own task and may not have started the execution yet.
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(project) = stack.registry.get(&pid) {
                if project.state == tether_core::ProjectState::Executing {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("execution reached EXECUTING before timeout");

    send(&mut ws, json!({"type": "agent_kill", "project_id": project_id})).await;

    let mut saw_killed_error = false;
    let mut saw_idle = false;
    for _ in 0..6 {
        let frame = recv(&mut ws).await;
        if frame["type"] == "error" && frame["data"]["code"] == "PROCESS_KILLED" {
            saw_killed_error = true;
        }
        if frame["type"] == "project_state" && frame["data"]["state"] == "IDLE" {
            saw_idle = true;
        }
        if saw_killed_error && saw_idle {
            break;
        }
    }
    assert!(saw_killed_error, "expected a PROCESS_KILLED error reply");
    assert!(saw_idle, "expected the project to return to IDLE");

    stack.executor.set_behavior(
        pid,
        Behavior::Complete { messages: vec![json!({"text": "back to work"})], session_id: Some("after-kill".into()) },
    );
    send(&mut ws, json!({"type": "execute", "project_id": project_id, "data": {"prompt": "again"}})).await;

    let mut saw_agent_message = false;
    for _ in 0..4 {
        let frame = recv(&mut ws).await;
        if frame["type"] == "agent_message" {
            saw_agent_message = true;
            break;
        }
    }
    assert!(saw_agent_message, "expected the project to execute normally after being killed");

    stack.shutdown.cancel();
}
