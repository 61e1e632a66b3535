//! Owns one lazily-created `MessageLog` per project, rooted at
//! `<data_root>/projects/<project-id>/logs/`.

use crate::log::{LogError, MessageLog, RotationPolicy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tether_core::{Direction, ProjectId};

pub struct LogRegistry {
    data_root: PathBuf,
    policy: RotationPolicy,
    logs: RwLock<HashMap<ProjectId, Arc<MessageLog>>>,
}

impl LogRegistry {
    pub fn new(data_root: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self { data_root: data_root.into(), policy, logs: RwLock::new(HashMap::new()) }
    }

    fn log_dir(&self, id: &ProjectId) -> PathBuf {
        self.data_root.join("projects").join(id.as_str()).join("logs")
    }

    pub fn get_or_create(&self, id: &ProjectId) -> Arc<MessageLog> {
        if let Some(log) = self.logs.read().get(id) {
            return log.clone();
        }
        let mut logs = self.logs.write();
        logs.entry(id.clone())
            .or_insert_with(|| Arc::new(MessageLog::new(self.log_dir(id))))
            .clone()
    }

    pub fn append(
        &self,
        id: &ProjectId,
        direction: Direction,
        payload: serde_json::Value,
    ) -> Result<(), LogError> {
        self.get_or_create(id).append(direction, payload)
    }

    pub fn messages_since(
        &self,
        id: &ProjectId,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<tether_core::TimestampedMessage>, LogError> {
        self.get_or_create(id).messages_since(since)
    }

    /// Drop the cached handle for a deleted project. The on-disk log directory itself is
    /// removed by `ProjectRegistry::delete`, which owns the whole project directory.
    pub fn forget(&self, id: &ProjectId) {
        self.logs.write().remove(id);
    }
}

#[cfg(test)]
#[path = "log_registry_tests.rs"]
mod tests;
