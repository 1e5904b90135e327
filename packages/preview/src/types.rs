use chrono::{DateTime, Utc};
use codexa_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The two runtimes a preview consists of. Each one maps to a logical root
/// in the stored file tree and to one fixed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Frontend,
    Backend,
}

impl Role {
    /// Directory name of the logical root, also the stored path prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Frontend => "frontend",
            Role::Backend => "backend",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed ports for the two preview roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPorts {
    pub frontend: u16,
    pub backend: u16,
}

impl PreviewPorts {
    pub fn for_role(&self, role: Role) -> u16 {
        match role {
            Role::Frontend => self.frontend,
            Role::Backend => self.backend,
        }
    }
}

/// Scratch directory holding one project's materialized roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWorkspace {
    pub project_id: String,
    pub root_dir: PathBuf,
}

impl ProjectWorkspace {
    pub fn new(project_id: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            root_dir: root_dir.into(),
        }
    }

    pub fn dir_for(&self, role: Role) -> PathBuf {
        self.root_dir.join(role.as_str())
    }

    pub fn frontend_dir(&self) -> PathBuf {
        self.dir_for(Role::Frontend)
    }

    pub fn backend_dir(&self) -> PathBuf {
        self.dir_for(Role::Backend)
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root_dir)
    }
}

/// Lifecycle of the supervised process pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
        }
    }
}

/// The single active preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSession {
    pub project_id: String,
    pub workspace: ProjectWorkspace,
    pub ports: PreviewPorts,
    pub status: SupervisorState,
    pub generation: u64,
    pub frontend_pid: Option<u32>,
    pub backend_pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// What `status()` reports. Serializes to `{"status":"idle"}` or
/// `{"status":"running","project_id":..,"frontend_port":..,"backend_port":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PreviewStatus {
    Idle,
    Running {
        project_id: String,
        frontend_port: u16,
        backend_port: u16,
    },
}

/// URLs handed back to the caller of `start_preview`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewUrls {
    pub frontend: String,
    pub backend: String,
}

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Frontend,
    Backend,
    System,
}

impl From<Role> for LogSource {
    fn from(role: Role) -> Self {
        match role {
            Role::Frontend => LogSource::Frontend,
            Role::Backend => LogSource::Backend,
        }
    }
}

/// Log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Stdout,
    Stderr,
    System,
}

/// Captured preview output or supervisor event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewLog {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub log_type: LogType,
    pub message: String,
}

/// Failure of a dependency heal cycle. Never surfaced to HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealError {
    #[error("Dependency reinstall failed: {reason}")]
    Reinstall { reason: String },

    #[error("Dependency reinstall timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to relaunch frontend: {reason}")]
    Relaunch { reason: String },

    #[error("IO error during heal: {0}")]
    Io(String),
}

/// Failure while sweeping orphaned processes. Always swallowed.
#[derive(Debug, thiserror::Error)]
pub enum ReapError {
    #[error("Process {pid} vanished before it could be killed")]
    Vanished { pid: u32 },

    #[error("Access denied to process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    #[error("Failed to enumerate {what}: {reason}")]
    Enumeration { what: &'static str, reason: String },
}

/// Error types for preview operations
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("Invalid project ID '{project_id}': {reason}")]
    InvalidProjectId { project_id: String, reason: String },

    #[error("No {root} files found for project {project_id}")]
    EmptyWorkspace { project_id: String, root: Role },

    #[error("Failed to launch {role} process '{command}': {reason}")]
    Launch {
        role: Role,
        command: String,
        reason: String,
    },

    #[error("Preview start for project {project_id} was cancelled by a stop request")]
    Cancelled { project_id: String },

    #[error("File store error: {0}")]
    FileStore(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for preview operations
pub type PreviewResult<T> = Result<T, PreviewError>;
