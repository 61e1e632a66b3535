//! Per-project fan-out: every session subscribed to a project receives every
//! `project_state`/`agent_message` frame produced for it, in the order they were produced.
//! A subscriber whose queue can't drain within `write_deadline` is evicted rather than
//! allowed to stall the broadcast for everyone else.

use crate::connections::ConnectionTable;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{ProjectId, SessionId};
use tether_wire::ServerMessage;
use tracing::warn;

const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(5);

pub struct Broadcaster {
    connections: Arc<ConnectionTable>,
    /// project -> subscribed sessions.
    subscribers: RwLock<HashMap<ProjectId, HashSet<SessionId>>>,
    /// session -> the one project it's currently subscribed to, for O(1) cleanup on
    /// disconnect and to enforce the at-most-one-join-per-session rule.
    joined: RwLock<HashMap<SessionId, ProjectId>>,
    write_deadline: Duration,
}

impl Broadcaster {
    pub fn new(connections: Arc<ConnectionTable>) -> Self {
        Self::with_write_deadline(connections, DEFAULT_WRITE_DEADLINE)
    }

    /// Same as `new`, with a caller-supplied write deadline — used by tests that need to
    /// exercise the slow-subscriber eviction path without waiting out the real default.
    pub fn with_write_deadline(connections: Arc<ConnectionTable>, write_deadline: Duration) -> Self {
        Self {
            connections,
            subscribers: RwLock::new(HashMap::new()),
            joined: RwLock::new(HashMap::new()),
            write_deadline,
        }
    }

    /// Subscribe `session_id` to `project_id`, implicitly leaving whatever it was
    /// subscribed to before.
    pub fn subscribe(&self, project_id: ProjectId, session_id: SessionId) {
        let previous = self.joined.write().insert(session_id.clone(), project_id.clone());
        if let Some(previous) = previous {
            if previous != project_id {
                self.remove_subscriber(&previous, &session_id);
            }
        }
        self.subscribers.write().entry(project_id).or_default().insert(session_id);
    }

    /// Leave `project_id` if that's what the session is currently subscribed to. A leave
    /// that doesn't match the current subscription is a no-op, since the caller (e.g.
    /// `project_deleted` broadcast cleanup) may race with an explicit client leave.
    pub fn unsubscribe(&self, project_id: &ProjectId, session_id: &SessionId) {
        let still_joined = self.joined.read().get(session_id) == Some(project_id);
        if !still_joined {
            return;
        }
        self.joined.write().remove(session_id);
        self.remove_subscriber(project_id, session_id);
    }

    /// Drop every subscription a disconnecting session held.
    pub fn forget_session(&self, session_id: &SessionId) {
        if let Some(project_id) = self.joined.write().remove(session_id) {
            self.remove_subscriber(&project_id, session_id);
        }
    }

    fn remove_subscriber(&self, project_id: &ProjectId, session_id: &SessionId) {
        let mut subscribers = self.subscribers.write();
        if let Some(set) = subscribers.get_mut(project_id) {
            set.remove(session_id);
            if set.is_empty() {
                subscribers.remove(project_id);
            }
        }
    }

    pub fn subscriber_count(&self, project_id: &ProjectId) -> usize {
        self.subscribers.read().get(project_id).map(HashSet::len).unwrap_or(0)
    }

    /// The project `session_id` is currently subscribed to, if any — used to resolve a
    /// message that omits an explicit `project_id`.
    pub fn current_project(&self, session_id: &SessionId) -> Option<ProjectId> {
        self.joined.read().get(session_id).cloned()
    }

    /// Clear every subscriber of a project that was just deleted, and their reverse
    /// `joined` entries, without broadcasting anything further.
    pub fn drop_project(&self, project_id: &ProjectId) {
        if let Some(sessions) = self.subscribers.write().remove(project_id) {
            let mut joined = self.joined.write();
            for session_id in sessions {
                joined.remove(&session_id);
            }
        }
    }

    /// Deliver `message` to every session subscribed to `project_id`, concurrently — a
    /// subscriber whose channel is full past `write_deadline` (a slow or stuck client) is
    /// evicted on its own, without making its siblings wait out the same deadline.
    pub async fn broadcast(&self, project_id: &ProjectId, message: ServerMessage) {
        let targets: Vec<SessionId> =
            self.subscribers.read().get(project_id).map(|set| set.iter().cloned().collect()).unwrap_or_default();

        futures_util::future::join_all(
            targets.into_iter().map(|session_id| self.send_one(project_id, session_id, message.clone())),
        )
        .await;
    }

    async fn send_one(&self, project_id: &ProjectId, session_id: SessionId, message: ServerMessage) {
        let Some(handle) = self.connections.get(&session_id) else {
            self.remove_subscriber(project_id, &session_id);
            return;
        };
        let outcome = tokio::time::timeout(self.write_deadline, handle.sender.send(message)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                warn!(%session_id, %project_id, "evicting slow or gone subscriber");
                self.remove_subscriber(project_id, &session_id);
                self.joined.write().remove(&session_id);
                self.connections.evict(&session_id);
            }
        }
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
