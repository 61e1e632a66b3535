//! Project Registry: owns the set of projects, persists metadata atomically, enforces
//! path rules, recovers on startup.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tether_core::{project::paths_nest, Clock, Project, ProjectId, ProjectState, SystemClock};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("path is invalid: {0}")]
    InvalidPath(String),
    #[error("project path nests with an existing project")]
    ProjectNesting,
    #[error("project not found")]
    ProjectNotFound,
    #[error("project has an execution in progress")]
    ProcessActive,
    #[error("maximum number of projects reached")]
    ResourceLimit,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn code(&self) -> tether_core::ErrorCode {
        use tether_core::ErrorCode::*;
        match self {
            RegistryError::InvalidPath(_) => InvalidPath,
            RegistryError::ProjectNesting => ProjectNesting,
            RegistryError::ProjectNotFound => ProjectNotFound,
            RegistryError::ProcessActive => ProcessActive,
            RegistryError::ResourceLimit => ResourceLimit,
            RegistryError::Io(_) | RegistryError::Encode(_) => InternalError,
        }
    }
}

/// The on-disk representation of a project. Deliberately narrower than `Project`: `state`
/// is runtime-only (every recovered project starts `Idle` — a crash mid-execution cannot
/// have left a live child process behind).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectMetadata {
    id: String,
    path: PathBuf,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl From<&Project> for ProjectMetadata {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id.as_str().to_string(),
            path: p.path.clone(),
            session_id: p.session_id.clone(),
            created_at: p.created_at,
            last_active: p.last_active,
        }
    }
}

impl ProjectMetadata {
    fn into_project(self) -> Project {
        Project {
            id: ProjectId::from_string(self.id),
            path: self.path,
            session_id: self.session_id,
            state: ProjectState::Idle,
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

pub struct RegistryConfig {
    pub max_projects: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_projects: 100 }
    }
}

/// Owns the in-memory project map and its on-disk mirror under `<data_root>/projects/`.
pub struct ProjectRegistry<C: Clock = SystemClock> {
    data_root: PathBuf,
    config: RegistryConfig,
    clock: C,
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl ProjectRegistry<SystemClock> {
    pub fn new(data_root: impl Into<PathBuf>, config: RegistryConfig) -> Self {
        Self::with_clock(data_root, config, SystemClock)
    }
}

impl<C: Clock> ProjectRegistry<C> {
    pub fn with_clock(data_root: impl Into<PathBuf>, config: RegistryConfig, clock: C) -> Self {
        Self { data_root: data_root.into(), config, clock, projects: RwLock::new(HashMap::new()) }
    }

    fn project_dir(&self, id: &ProjectId) -> PathBuf {
        self.data_root.join("projects").join(id.as_str())
    }

    fn metadata_path(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join("metadata.json")
    }

    /// Load every project whose `metadata.json` parses under `<data_root>/projects/`.
    ///
    /// A single unreadable or malformed entry is logged and skipped, never treated as
    /// fatal and never deleted. After loading, any pair of recovered projects that
    /// now violates the no-nesting invariant is resolved by quarantining (not serving, not
    /// deleting) the one created later.
    pub fn load(data_root: impl Into<PathBuf>, config: RegistryConfig, clock: C) -> Self {
        let data_root = data_root.into();
        let mut loaded: Vec<Project> = Vec::new();
        let projects_dir = data_root.join("projects");
        if let Ok(entries) = fs::read_dir(&projects_dir) {
            for entry in entries.flatten() {
                let metadata_path = entry.path().join("metadata.json");
                match fs::read(&metadata_path) {
                    Ok(bytes) => match serde_json::from_slice::<ProjectMetadata>(&bytes) {
                        Ok(metadata) => loaded.push(metadata.into_project()),
                        Err(e) => {
                            error!(path = %metadata_path.display(), error = %e, "skipping project with malformed metadata");
                        }
                    },
                    Err(e) => {
                        error!(path = %metadata_path.display(), error = %e, "skipping unreadable project metadata");
                    }
                }
            }
        }

        loaded.sort_by_key(|p| p.created_at);
        let mut kept: Vec<Project> = Vec::new();
        for candidate in loaded {
            let conflicts = kept.iter().any(|p| paths_nest(&p.path, &candidate.path));
            if conflicts {
                warn!(
                    project_id = %candidate.id,
                    path = %candidate.path.display(),
                    "quarantining project: path nests with an already-recovered project"
                );
                continue;
            }
            kept.push(candidate);
        }

        let projects = kept.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self { data_root, config, clock, projects: RwLock::new(projects) }
    }

    pub fn create(&self, path: PathBuf) -> Result<Project, RegistryError> {
        let canonical = canonicalize(&path)?;

        let mut projects = self.projects.write();
        if projects.len() >= self.config.max_projects {
            return Err(RegistryError::ResourceLimit);
        }
        if projects.values().any(|p| p.nests_with(&canonical)) {
            return Err(RegistryError::ProjectNesting);
        }

        let project = Project::new(canonical, self.clock.now());
        self.persist(&project)?;
        projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    pub fn delete(&self, id: &ProjectId) -> Result<(), RegistryError> {
        let mut projects = self.projects.write();
        let project = projects.get(id).ok_or(RegistryError::ProjectNotFound)?;
        if !project.state.deletable() {
            return Err(RegistryError::ProcessActive);
        }
        let dir = self.project_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        projects.remove(id);
        Ok(())
    }

    pub fn get(&self, id: &ProjectId) -> Option<Project> {
        self.projects.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Project> {
        self.projects.read().values().cloned().collect()
    }

    /// Update `session_id` (used by the executor after a successful run). Persists before
    /// returning — if the write fails, the in-memory mutation is reverted so a
    /// restart is consistent with what the client already observed.
    pub fn update_session(
        &self,
        id: &ProjectId,
        session_id: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(id).ok_or(RegistryError::ProjectNotFound)?;
        let previous = project.session_id.clone();
        project.session_id = session_id;
        project.last_active = self.clock.now();
        if let Err(e) = self.persist(project) {
            project.session_id = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn clear_session(&self, id: &ProjectId) -> Result<(), RegistryError> {
        self.update_session(id, None)
    }

    pub fn set_state(&self, id: &ProjectId, state: ProjectState) -> Result<(), RegistryError> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(id).ok_or(RegistryError::ProjectNotFound)?;
        project.state = state;
        project.last_active = self.clock.now();
        Ok(())
    }

    pub fn mutate<R>(
        &self,
        id: &ProjectId,
        f: impl FnOnce(&mut Project) -> R,
    ) -> Result<R, RegistryError> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(id).ok_or(RegistryError::ProjectNotFound)?;
        Ok(f(project))
    }

    /// Atomic temp-file + rename write of `metadata.json` (the rename is the commit
    /// point).
    fn persist(&self, project: &Project) -> Result<(), RegistryError> {
        let dir = self.project_dir(&project.id);
        fs::create_dir_all(&dir)?;
        let metadata = ProjectMetadata::from(project);
        let bytes = serde_json::to_vec_pretty(&metadata)?;
        let final_path = self.metadata_path(&project.id);
        let tmp_path = dir.join(format!(".metadata.json.{}.tmp", nanoid::nanoid!(8)));
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

/// Absolute, existing-directory path check. Rejects parent-traversal components outright
/// rather than letting `canonicalize()` silently resolve them away.
fn canonicalize(path: &Path) -> Result<PathBuf, RegistryError> {
    if !path.is_absolute() {
        return Err(RegistryError::InvalidPath("path must be absolute".into()));
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(RegistryError::InvalidPath("path contains parent-traversal components".into()));
    }
    let canonical = path
        .canonicalize()
        .map_err(|_| RegistryError::InvalidPath("path does not exist".into()))?;
    if !canonical.is_dir() {
        return Err(RegistryError::InvalidPath("path is not a directory".into()));
    }
    Ok(canonical)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
