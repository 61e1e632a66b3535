//! The `Project` aggregate and its execution state machine.

use crate::id::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A project's execution state.
///
/// ```text
/// Idle --execute--> Executing --ok--> Idle
/// Executing --timeout|kill|failure--> Error --next-execute--> Executing
/// Idle --reset-session--> Idle (clears session_id)
/// ```
///
/// `delete` is permitted from `Idle` and `Error` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectState {
    Idle,
    Executing,
    Error,
}

impl ProjectState {
    /// Whether `project_delete` is permitted from this state.
    pub fn deletable(self) -> bool {
        matches!(self, ProjectState::Idle | ProjectState::Error)
    }
}

/// A unit of work bound to one absolute filesystem path.
///
/// `subscribers` and `message_log` are deliberately absent here: the subscriber set is
/// in-memory-only server state (owned by the broadcaster's arena, see `tether-server`) and
/// the log handle is owned by `tether-storage`. Keeping `Project` a plain serializable
/// value means the wire layer can turn it into a `project_state` frame with no bespoke
/// view type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    pub session_id: Option<String>,
    pub state: ProjectState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Project {
    pub fn new(path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id: ProjectId::new(),
            path,
            session_id: None,
            state: ProjectState::Idle,
            created_at: now,
            last_active: now,
        }
    }

    /// True if `other` nests inside `self`, or vice versa — i.e. one canonical path is a
    /// prefix (in the path-component sense, not byte-prefix sense) of the other.
    pub fn nests_with(&self, other_path: &std::path::Path) -> bool {
        paths_nest(&self.path, other_path)
    }
}

/// Component-wise prefix check: `/a/b` nests with `/a/b/c` but not with `/a/bc`.
pub fn paths_nest(a: &std::path::Path, b: &std::path::Path) -> bool {
    if a == b {
        return true;
    }
    let mut a_components = a.components();
    let mut b_components = b.components();
    loop {
        match (a_components.next(), b_components.next()) {
            (Some(x), Some(y)) if x == y => continue,
            (None, _) | (_, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
