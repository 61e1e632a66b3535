//! `tetherd`: binds the WebSocket listener, wires storage and the executor together, and
//! runs until asked to shut down.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod logging;
mod notifier;

use clap::Parser;
use config::Config;
use notifier::BroadcastNotifier;
use std::sync::Arc;
use tether_executor::{AgentExecutor, ExecutorConfig, ProcessExecutor};
use tether_server::{Broadcaster, ConnectionTable, RateLimiter, ServerState};
use tether_storage::{LogRegistry, ProjectRegistry, RegistryConfig, RotationPolicy};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_STARTUP_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let _log_guard = logging::init(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "fatal startup failure");
        std::process::exit(EXIT_STARTUP_FAILURE);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let registry = Arc::new(ProjectRegistry::load(
        config.data_dir.clone(),
        RegistryConfig { max_projects: config.max_projects },
        tether_core::SystemClock,
    ));
    info!(count = registry.list().len(), "recovered projects from disk");

    let logs = Arc::new(LogRegistry::new(
        config.data_dir.clone(),
        RotationPolicy { max_bytes: config.log_rotate_size, max_entries: config.log_rotate_entries },
    ));

    let connections = Arc::new(ConnectionTable::new(config.max_connections, config.max_connections_per_ip));
    let broadcaster = Arc::new(Broadcaster::new(connections.clone()));
    let notifier = Arc::new(BroadcastNotifier::new(broadcaster.clone()));
    let shutdown = CancellationToken::new();

    let executor: Arc<dyn AgentExecutor> = Arc::new(ProcessExecutor::new(
        ExecutorConfig {
            agent_path: config.agent_path.clone(),
            max_concurrent_executions: config.max_concurrent_executions,
            execution_timeout: config.execution_timeout,
        },
        registry.clone(),
        logs.clone(),
        notifier,
        shutdown.child_token(),
    ));

    let state = Arc::new(ServerState {
        registry: registry.clone(),
        logs,
        executor,
        connections: connections.clone(),
        broadcaster: broadcaster.clone(),
    });

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");

    let server_config = Arc::new(config.server_config());
    let rate_limiter = Arc::new(RateLimiter::new(config.connections_per_ip_rate));

    let accept_task = tokio::spawn(tether_server::accept_loop(
        listener,
        state,
        server_config,
        rate_limiter,
        shutdown.child_token(),
    ));
    let stats_task =
        tokio::spawn(tether_server::stats::run(registry, connections, shutdown.child_token()));

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, draining connections");
    shutdown.cancel();

    // `accept_task` only resolves once every connection it spawned (and every dispatch,
    // including in-flight executions, each of those connections spawned in turn) has
    // finished, since cancelling `shutdown` is what unblocks all of them.
    let drained = tokio::time::timeout(config.shutdown_grace, accept_task).await;
    if drained.is_err() {
        warn!(grace = ?config.shutdown_grace, "shutdown grace period elapsed with sessions still active");
    }
    let _ = stats_task.await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
