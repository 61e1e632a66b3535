//! The process-backed `AgentExecutor`: spawns the agent CLI, tracks active
//! children per project, enforces sequentiality and a global concurrency ceiling, and
//! handles timeout/kill via a graceful SIGTERM-then-SIGKILL escalation.

use crate::command::build_args;
use crate::error::ExecutorError;
use crate::parse::parse_agent_output;
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Direction, Project, ProjectId, ProjectState};
use tether_storage::{LogRegistry, ProjectRegistry};
use tether_wire::ExecuteOptions;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Persisted state changes and in-flight agent output, for whoever owns fan-out to
/// subscribed WebSocket clients (`tether-server::broadcast`).
pub trait StateNotifier: Send + Sync {
    fn project_changed(&self, project: &Project);
}

/// No-op notifier for tests and standalone executor use.
pub struct NullNotifier;

impl StateNotifier for NullNotifier {
    fn project_changed(&self, _project: &Project) {}
}

/// Outcome of one completed execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub messages: Vec<serde_json::Value>,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        project_id: &ProjectId,
        prompt: String,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutorError>;

    async fn kill(&self, project_id: &ProjectId) -> Result<(), ExecutorError>;
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub agent_path: PathBuf,
    pub max_concurrent_executions: usize,
    pub execution_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_path: PathBuf::from("claude"),
            max_concurrent_executions: 10,
            execution_timeout: Duration::from_secs(5 * 60),
        }
    }
}

struct ActiveProcess {
    pid: u32,
    cancel: CancellationToken,
}

enum Termination {
    Completed(std::process::Output),
    TimedOut,
    Killed,
}

/// Spawns the agent CLI as a child process per execution.
pub struct ProcessExecutor {
    config: ExecutorConfig,
    registry: Arc<ProjectRegistry>,
    logs: Arc<LogRegistry>,
    notifier: Arc<dyn StateNotifier>,
    active: Mutex<HashMap<ProjectId, ActiveProcess>>,
    global: Arc<Semaphore>,
    /// Cancelled by the daemon on shutdown, independently of any per-project kill — every
    /// in-flight execution watches this alongside its own cancel token so a shutdown
    /// terminates active agent processes rather than abandoning them.
    shutdown: CancellationToken,
}

impl ProcessExecutor {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<ProjectRegistry>,
        logs: Arc<LogRegistry>,
        notifier: Arc<dyn StateNotifier>,
        shutdown: CancellationToken,
    ) -> Self {
        let global = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Self { config, registry, logs, notifier, active: Mutex::new(HashMap::new()), global, shutdown }
    }

    fn reserve_slot(&self, project_id: &ProjectId) -> Result<(), ExecutorError> {
        let mut active = self.active.lock();
        if active.contains_key(project_id) {
            return Err(ExecutorError::ProcessActive);
        }
        active.insert(
            project_id.clone(),
            ActiveProcess { pid: 0, cancel: CancellationToken::new() },
        );
        Ok(())
    }

    fn record_pid(&self, project_id: &ProjectId, pid: u32) {
        if let Some(entry) = self.active.lock().get_mut(project_id) {
            entry.pid = pid;
        }
    }

    fn cancel_token(&self, project_id: &ProjectId) -> Option<CancellationToken> {
        self.active.lock().get(project_id).map(|p| p.cancel.clone())
    }

    fn release_slot(&self, project_id: &ProjectId) {
        self.active.lock().remove(project_id);
    }

    fn set_state(&self, project_id: &ProjectId, state: ProjectState) {
        match self.registry.set_state(project_id, state) {
            Ok(()) => {
                if let Some(project) = self.registry.get(project_id) {
                    self.notifier.project_changed(&project);
                }
            }
            Err(e) => error!(%project_id, error = %e, "failed to persist project state transition"),
        }
    }
}

#[async_trait]
impl AgentExecutor for ProcessExecutor {
    async fn execute(
        &self,
        project_id: &ProjectId,
        prompt: String,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let span = tracing::info_span!("executor.execute", %project_id);
        async {
            self.reserve_slot(project_id)?;
            let result = self.execute_inner(project_id, prompt, options).await;
            self.release_slot(project_id);
            result
        }
        .instrument(span)
        .await
    }

    async fn kill(&self, project_id: &ProjectId) -> Result<(), ExecutorError> {
        let cancel = self.cancel_token(project_id).ok_or(ExecutorError::ProcessNotActive)?;
        info!(%project_id, "killing active execution");
        cancel.cancel();
        Ok(())
    }
}

impl ProcessExecutor {
    async fn execute_inner(
        &self,
        project_id: &ProjectId,
        prompt: String,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let permit = self
            .global
            .clone()
            .try_acquire_owned()
            .map_err(|_| ExecutorError::ResourceLimit)?;

        let project = self.registry.get(project_id).ok_or(ExecutorError::ProjectNotFound)?;
        self.set_state(project_id, ProjectState::Executing);

        let cwd = project.path.to_string_lossy().to_string();
        let args = build_args(project.session_id.as_deref(), &cwd, &options, &prompt);

        let start = std::time::Instant::now();
        let spawn_result = Command::new(&self.config.agent_path)
            .args(&args)
            .current_dir(&project.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                self.set_state(project_id, ProjectState::Error);
                drop(permit);
                return Err(ExecutorError::Io(e));
            }
        };

        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                self.set_state(project_id, ProjectState::Error);
                drop(permit);
                return Err(ExecutorError::Io(std::io::Error::other(
                    "agent process exited before its pid could be read",
                )));
            }
        };
        self.record_pid(project_id, pid);

        if let Err(e) = self.logs.append(project_id, Direction::Client, serde_json::json!(prompt))
        {
            warn!(%project_id, error = %e, "failed to append client prompt to message log");
        }

        let cancel = self
            .cancel_token(project_id)
            .unwrap_or_else(CancellationToken::new);

        let wait_future = child.wait_with_output();
        tokio::pin!(wait_future);

        let termination = tokio::select! {
            output = &mut wait_future => {
                match output {
                    Ok(output) => Termination::Completed(output),
                    Err(e) => {
                        self.set_state(project_id, ProjectState::Error);
                        drop(permit);
                        return Err(ExecutorError::Io(e));
                    }
                }
            }
            _ = tokio::time::sleep(self.config.execution_timeout) => {
                warn!(%project_id, pid, "execution timed out, terminating agent process");
                terminate(pid).await;
                let _ = wait_future.await;
                Termination::TimedOut
            }
            _ = cancel.cancelled() => {
                info!(%project_id, pid, "execution cancelled, terminating agent process");
                terminate(pid).await;
                let _ = wait_future.await;
                Termination::Killed
            }
            _ = self.shutdown.cancelled() => {
                info!(%project_id, pid, "daemon shutting down, terminating agent process");
                terminate(pid).await;
                let _ = wait_future.await;
                Termination::Killed
            }
        };

        drop(permit);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match termination {
            Termination::TimedOut => {
                self.set_state(project_id, ProjectState::Error);
                error!(%project_id, elapsed_ms, "execution timed out");
                Err(ExecutorError::ExecutionTimeout)
            }
            Termination::Killed => {
                self.set_state(project_id, ProjectState::Idle);
                info!(%project_id, elapsed_ms, "execution killed");
                Err(ExecutorError::ProcessKilled)
            }
            Termination::Completed(output) => {
                match parse_agent_output(&output.stdout, &output.stderr) {
                    Ok(parsed) => {
                        for message in &parsed.messages {
                            if let Err(e) = self.logs.append(
                                project_id,
                                Direction::Agent,
                                message.clone(),
                            ) {
                                warn!(%project_id, error = %e, "failed to append agent message to message log");
                            }
                        }
                        if let Some(session_id) = &parsed.session_id {
                            if let Err(e) = self
                                .registry
                                .update_session(project_id, Some(session_id.clone()))
                            {
                                error!(%project_id, error = %e, "failed to persist new session id");
                            }
                        }
                        self.set_state(project_id, ProjectState::Idle);
                        info!(%project_id, elapsed_ms, "execution completed");
                        Ok(ExecutionOutcome {
                            messages: parsed.messages,
                            session_id: parsed.session_id,
                        })
                    }
                    Err(e) => {
                        self.set_state(project_id, ProjectState::Error);
                        error!(%project_id, elapsed_ms, error = %e, "execution failed");
                        Err(e)
                    }
                }
            }
        }
    }
}

async fn terminate(pid: u32) {
    send_signal(pid, Signal::SIGTERM);
    tokio::time::sleep(KILL_GRACE_PERIOD).await;
    send_signal(pid, Signal::SIGKILL);
}

fn send_signal(pid: u32, signal: Signal) {
    // ESRCH (process already exited) is expected and not logged as an error.
    let _ = kill(Pid::from_raw(pid as i32), signal);
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
