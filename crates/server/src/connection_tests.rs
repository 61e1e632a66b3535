use super::*;
use crate::broadcast::Broadcaster;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tempfile::tempdir;
use tether_executor::{AgentExecutor, ExecutionOutcome, ExecutorError};
use tether_storage::{LogRegistry, ProjectRegistry, RegistryConfig, RotationPolicy};
use tether_wire::ExecuteOptions;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

struct IdleExecutor;

#[async_trait]
impl AgentExecutor for IdleExecutor {
    async fn execute(
        &self,
        _project_id: &tether_core::ProjectId,
        _prompt: String,
        _options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        Err(ExecutorError::ProcessNotActive)
    }

    async fn kill(&self, _project_id: &tether_core::ProjectId) -> Result<(), ExecutorError> {
        Err(ExecutorError::ProcessNotActive)
    }
}

async fn spawn_server(config: ServerConfig) -> (SocketAddr, CancellationToken, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let registry = Arc::new(ProjectRegistry::new(dir.path(), RegistryConfig::default()));
    let logs = Arc::new(LogRegistry::new(dir.path(), RotationPolicy::default()));
    let connections = Arc::new(ConnectionTable::new(config.max_connections, config.max_connections_per_ip));
    let broadcaster = Arc::new(Broadcaster::new(connections.clone()));
    let state = Arc::new(ServerState {
        registry,
        logs,
        executor: Arc::new(IdleExecutor),
        connections,
        broadcaster,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rate_limiter = Arc::new(RateLimiter::new(1000));
    let shutdown = CancellationToken::new();

    tokio::spawn(accept_loop(listener, state, Arc::new(config), rate_limiter, shutdown.clone()));

    (addr, shutdown, dir)
}

#[tokio::test]
async fn a_project_list_request_gets_a_project_list_reply() {
    let (addr, shutdown, _dir) = spawn_server(ServerConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();

    ws.send(Message::Text(r#"{"type":"project_list"}"#.into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("reply within timeout")
        .expect("stream open")
        .expect("no transport error");

    let Message::Text(text) = reply else { panic!("expected a text frame") };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "project_list");

    shutdown.cancel();
}

#[tokio::test]
async fn a_malformed_frame_gets_a_validation_error_reply() {
    let (addr, shutdown, _dir) = spawn_server(ServerConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();

    ws.send(Message::Text(r#"{"type":"not_a_real_type"}"#.into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("reply within timeout")
        .expect("stream open")
        .expect("no transport error");

    let Message::Text(text) = reply else { panic!("expected a text frame") };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["data"]["code"], "UNKNOWN_MESSAGE_TYPE");

    shutdown.cancel();
}

#[tokio::test]
async fn a_disallowed_origin_is_rejected_at_the_handshake() {
    let mut config = ServerConfig::default();
    config.allowed_origins = vec!["https://allowed.example".to_string()];
    let (addr, shutdown, _dir) = spawn_server(config).await;

    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://not-allowed.example".parse().unwrap());

    let result = tokio_tungstenite::connect_async(request).await;
    assert!(result.is_err());

    shutdown.cancel();
}
