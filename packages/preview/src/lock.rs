// ABOUTME: Session lock file persisted next to the preview workspaces
// ABOUTME: Lets a restarted service find and reap the previous run's processes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::types::{PreviewPorts, PreviewResult, PreviewSession, ProjectWorkspace};

/// Persisted description of the running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLock {
    pub project_id: String,
    pub workspace_root: PathBuf,
    pub ports: PreviewPorts,
    pub frontend_pid: Option<u32>,
    pub backend_pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

impl SessionLock {
    pub fn workspace(&self) -> ProjectWorkspace {
        ProjectWorkspace::new(&self.project_id, &self.workspace_root)
    }
}

impl From<&PreviewSession> for SessionLock {
    fn from(session: &PreviewSession) -> Self {
        Self {
            project_id: session.project_id.clone(),
            workspace_root: session.workspace.root_dir.clone(),
            ports: session.ports,
            frontend_pid: session.frontend_pid,
            backend_pid: session.backend_pid,
            started_at: session.started_at,
        }
    }
}

/// Load the lock file. A missing or unreadable file yields `None`.
pub async fn read_lock(path: &Path) -> Option<SessionLock> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read session lock {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(lock) => Some(lock),
        Err(e) => {
            warn!("Ignoring corrupt session lock {:?}: {}", path, e);
            None
        }
    }
}

pub async fn write_lock(path: &Path, lock: &SessionLock) -> PreviewResult<()> {
    let json = serde_json::to_string_pretty(lock)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, json).await?;

    info!(
        "Created session lock for project: {} at {:?}",
        lock.project_id, path
    );
    Ok(())
}

pub async fn remove_lock(path: &Path) -> PreviewResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed session lock at {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
