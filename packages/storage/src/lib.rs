//! Codexa Storage - generated project files keyed by project id and path.
//!
//! The preview supervisor only ever reads from this crate through the
//! [`FileStore`] trait. Writes happen upstream, after the generation pipeline
//! has produced a structure tree and it has been flattened into records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod memory;
pub mod sqlite;
pub mod structure;

pub use memory::InMemoryFileStore;
pub use sqlite::SqliteFileStore;
pub use structure::{flatten_structure, normalize_project_path, FlatFile, NodeType, StructureNode};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One generated file as persisted by the file store.
///
/// `path` is slash-separated and prefixed by its logical root, e.g.
/// `frontend/src/main.tsx` or `backend/main.py`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFile {
    pub project_id: String,
    pub path: String,
    pub content: String,
}

impl StoredFile {
    pub fn new(
        project_id: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub enable_wal: bool,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: codexa_config::default_database_path(),
            enable_wal: true,
            max_connections: 10,
            busy_timeout_seconds: 30,
        }
    }
}

/// Read access to generated project files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// All files stored for `project_id`, ordered by path. Unknown projects
    /// yield an empty list rather than an error.
    async fn list_files(&self, project_id: &str) -> StorageResult<Vec<StoredFile>>;
}
