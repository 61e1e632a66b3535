//! Shared harness for the end-to-end scenario tests: spins up the same storage/executor/
//! server stack `tetherd` wires together in `main.rs`, minus the CLI and signal handling,
//! with a scriptable `AgentExecutor` double standing in for the real agent CLI subprocess.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as PLMutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Direction, Project, ProjectId, ProjectState};
use tether_executor::{AgentExecutor, ExecutionOutcome, ExecutorError, StateNotifier};
use tether_server::{Broadcaster, ConnectionTable, RateLimiter, ServerConfig, ServerState};
use tether_storage::{LogRegistry, ProjectRegistry, RegistryConfig, RotationPolicy};
use tether_wire::{ExecuteOptions, ServerMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a scripted execution does once it's "running". Configured per project before the
/// triggering `execute` is sent.
pub enum Behavior {
    /// Completes immediately with the given agent output and (optionally) a new session id.
    Complete { messages: Vec<serde_json::Value>, session_id: Option<String> },
    /// Blocks until `kill` cancels it, then reports `PROCESS_KILLED` like a real terminated
    /// child would.
    HangUntilKilled,
}

/// Bridges the executor's state-change callback to the broadcaster, the same way
/// `tether-daemon::notifier::BroadcastNotifier` does in the real binary.
struct TestNotifier {
    broadcaster: Arc<Broadcaster>,
}

impl StateNotifier for TestNotifier {
    fn project_changed(&self, project: &Project) {
        let broadcaster = self.broadcaster.clone();
        let project = project.clone();
        tokio::spawn(async move {
            broadcaster.broadcast(&project.id.clone(), ServerMessage::ProjectState(project)).await;
        });
    }
}

/// A stand-in for `ProcessExecutor` that never spawns a real subprocess. Exercises the same
/// registry/log/notifier calls the real executor makes, so project state transitions,
/// message persistence, and session continuation all behave like production.
pub struct ScriptedExecutor {
    registry: Arc<ProjectRegistry>,
    logs: Arc<LogRegistry>,
    notifier: Arc<dyn StateNotifier>,
    behavior: PLMutex<HashMap<ProjectId, Behavior>>,
    cancels: PLMutex<HashMap<ProjectId, CancellationToken>>,
    observed_args: PLMutex<HashMap<ProjectId, Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(registry: Arc<ProjectRegistry>, logs: Arc<LogRegistry>, notifier: Arc<dyn StateNotifier>) -> Self {
        Self {
            registry,
            logs,
            notifier,
            behavior: PLMutex::new(HashMap::new()),
            cancels: PLMutex::new(HashMap::new()),
            observed_args: PLMutex::new(HashMap::new()),
        }
    }

    pub fn set_behavior(&self, project_id: ProjectId, behavior: Behavior) {
        self.behavior.lock().insert(project_id, behavior);
    }

    /// The argument vector the would-be agent CLI was invoked with for its most recent
    /// execution on this project (see `tether_executor::command::build_args`).
    pub fn observed_args(&self, project_id: &ProjectId) -> Option<Vec<String>> {
        self.observed_args.lock().get(project_id).cloned()
    }

    fn transition(&self, project_id: &ProjectId, state: ProjectState) {
        if self.registry.set_state(project_id, state).is_ok() {
            if let Some(project) = self.registry.get(project_id) {
                self.notifier.project_changed(&project);
            }
        }
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        project_id: &ProjectId,
        prompt: String,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let project = self.registry.get(project_id).ok_or(ExecutorError::ProcessNotActive)?;
        let cwd = project.path.to_string_lossy().to_string();
        let args = tether_executor::command::build_args(project.session_id.as_deref(), &cwd, &options, &prompt);
        self.observed_args.lock().insert(project_id.clone(), args);

        self.transition(project_id, ProjectState::Executing);
        let _ = self.logs.append(project_id, Direction::Client, serde_json::json!(prompt));

        match self.behavior.lock().remove(project_id) {
            Some(Behavior::Complete { messages, session_id }) => {
                for message in &messages {
                    let _ = self.logs.append(project_id, Direction::Agent, message.clone());
                }
                if let Some(session_id) = &session_id {
                    let _ = self.registry.update_session(project_id, Some(session_id.clone()));
                }
                self.transition(project_id, ProjectState::Idle);
                Ok(ExecutionOutcome { messages, session_id })
            }
            Some(Behavior::HangUntilKilled) => {
                let cancel = CancellationToken::new();
                self.cancels.lock().insert(project_id.clone(), cancel.clone());
                cancel.cancelled().await;
                self.cancels.lock().remove(project_id);
                self.transition(project_id, ProjectState::Idle);
                Err(ExecutorError::ProcessKilled)
            }
            None => {
                self.transition(project_id, ProjectState::Idle);
                Err(ExecutorError::ProcessNotActive)
            }
        }
    }

    async fn kill(&self, project_id: &ProjectId) -> Result<(), ExecutorError> {
        match self.cancels.lock().get(project_id).cloned() {
            Some(cancel) => {
                cancel.cancel();
                Ok(())
            }
            None => Err(ExecutorError::ProcessNotActive),
        }
    }
}

pub struct Stack {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub registry: Arc<ProjectRegistry>,
    pub logs: Arc<LogRegistry>,
    pub executor: Arc<ScriptedExecutor>,
}

/// Wire up registry, logs, executor, and server exactly like `tetherd` does on startup, and
/// start accepting connections on an OS-assigned loopback port.
pub async fn spawn_stack(data_dir: PathBuf, config: ServerConfig) -> Stack {
    let registry =
        Arc::new(ProjectRegistry::load(data_dir.clone(), RegistryConfig::default(), tether_core::SystemClock));
    let logs = Arc::new(LogRegistry::new(data_dir, RotationPolicy::default()));
    let connections = Arc::new(ConnectionTable::new(config.max_connections, config.max_connections_per_ip));
    let broadcaster = Arc::new(Broadcaster::new(connections.clone()));
    let notifier: Arc<dyn StateNotifier> = Arc::new(TestNotifier { broadcaster: broadcaster.clone() });
    let executor = Arc::new(ScriptedExecutor::new(registry.clone(), logs.clone(), notifier));

    let state = Arc::new(ServerState {
        registry: registry.clone(),
        logs: logs.clone(),
        executor: executor.clone() as Arc<dyn AgentExecutor>,
        connections,
        broadcaster,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rate_limiter = Arc::new(RateLimiter::new(1000));
    let shutdown = CancellationToken::new();

    tokio::spawn(tether_server::accept_loop(listener, state, Arc::new(config), rate_limiter, shutdown.child_token()));

    Stack { addr, shutdown, registry, logs, executor }
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

pub async fn send(ws: &mut WsStream, payload: serde_json::Value) {
    ws.send(Message::Text(payload.to_string().into())).await.unwrap();
}

pub async fn recv(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("reply within timeout")
            .expect("stream open")
            .expect("no transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Collect exactly `n` decoded frames, in arrival order.
pub async fn recv_n(ws: &mut WsStream, n: usize) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(recv(ws).await);
    }
    out
}
