//! The set of live sessions: one outbound queue and cancellation handle per connection,
//! plus the global and per-IP connection counters the accept loop enforces against.

use crate::error::ServerError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tether_core::SessionId;
use tether_wire::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connection's outbound handle: the channel its writer task drains, and a token the
/// writer task's read side watches to close the socket on eviction (slow-consumer or an
/// explicit disconnect triggered from elsewhere, e.g. project deletion).
#[derive(Clone)]
pub struct ConnectionHandle {
    pub addr: IpAddr,
    pub sender: mpsc::Sender<ServerMessage>,
    pub cancel: CancellationToken,
}

pub struct ConnectionTable {
    max_connections: usize,
    max_per_ip: usize,
    sessions: RwLock<HashMap<SessionId, ConnectionHandle>>,
    per_ip_count: RwLock<HashMap<IpAddr, usize>>,
}

impl ConnectionTable {
    pub fn new(max_connections: usize, max_per_ip: usize) -> Self {
        Self {
            max_connections,
            max_per_ip,
            sessions: RwLock::new(HashMap::new()),
            per_ip_count: RwLock::new(HashMap::new()),
        }
    }

    /// Register a newly accepted connection, enforcing the global and per-IP caps
    /// atomically against each other.
    pub fn register(
        &self,
        session_id: SessionId,
        addr: IpAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionHandle, ServerError> {
        let mut sessions = self.sessions.write();
        let mut per_ip = self.per_ip_count.write();

        if sessions.len() >= self.max_connections {
            return Err(ServerError::ConnectionLimit);
        }
        let count = per_ip.get(&addr).copied().unwrap_or(0);
        if count >= self.max_per_ip {
            return Err(ServerError::ConnectionLimit);
        }

        let handle = ConnectionHandle { addr, sender, cancel: CancellationToken::new() };
        sessions.insert(session_id, handle.clone());
        *per_ip.entry(addr).or_insert(0) += 1;
        Ok(handle)
    }

    /// Idempotent: a session already removed (e.g. by a concurrent eviction) is a no-op.
    pub fn remove(&self, session_id: &SessionId) {
        let removed = self.sessions.write().remove(session_id);
        if let Some(handle) = removed {
            let mut per_ip = self.per_ip_count.write();
            if let Some(count) = per_ip.get_mut(&handle.addr) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    per_ip.remove(&handle.addr);
                }
            }
        }
    }

    pub fn get(&self, session_id: &SessionId) -> Option<ConnectionHandle> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-close a session from elsewhere in the system (slow-consumer eviction). The
    /// connection's own write loop notices the cancellation and tears itself down, which
    /// keeps `remove` as the single place bookkeeping happens.
    pub fn evict(&self, session_id: &SessionId) {
        if let Some(handle) = self.get(session_id) {
            handle.cancel.cancel();
        }
    }

    pub fn broadcast_all(&self, message: ServerMessage) {
        for handle in self.sessions.read().values() {
            let _ = handle.sender.try_send(message.clone());
        }
    }
}

pub type SharedConnectionTable = Arc<ConnectionTable>;

#[cfg(test)]
#[path = "connections_tests.rs"]
mod tests;
