//! Periodic `stats` broadcast to every live connection: a cheap snapshot of
//! load, not a substitute for per-project `project_state`/`agent_message` fan-out.

use crate::connections::ConnectionTable;
use std::sync::Arc;
use std::time::Duration;
use tether_core::ProjectState;
use tether_storage::ProjectRegistry;
use tether_wire::ServerMessage;
use tokio_util::sync::CancellationToken;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run(
    registry: Arc<ProjectRegistry>,
    connections: Arc<ConnectionTable>,
    shutdown: CancellationToken,
) {
    run_with_interval(registry, connections, shutdown, STATS_INTERVAL).await
}

async fn run_with_interval(
    registry: Arc<ProjectRegistry>,
    connections: Arc<ConnectionTable>,
    shutdown: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let projects = registry.list();
                let executing_count = projects.iter().filter(|p| p.state == ProjectState::Executing).count();
                connections.broadcast_all(ServerMessage::Stats {
                    active_connections: connections.len() as u64,
                    active_projects: projects.len() as u64,
                    executing_count: executing_count as u64,
                });
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
