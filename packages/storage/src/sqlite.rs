use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::structure::{flatten_structure, normalize_project_path, StructureNode};
use crate::{FileStore, StorageConfig, StorageError, StorageResult, StoredFile};

/// SQLite implementation of [`FileStore`]
#[derive(Clone)]
pub struct SqliteFileStore {
    pool: SqlitePool,
}

impl SqliteFileStore {
    /// Open (creating if needed) the database described by `config` and make
    /// sure the schema exists.
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let database_url = format!("sqlite:{}", config.path.display());

        if !sqlx::Sqlite::database_exists(&database_url)
            .await
            .map_err(StorageError::Sqlx)?
        {
            debug!("Creating database at: {}", database_url);
            sqlx::Sqlite::create_database(&database_url)
                .await
                .map_err(StorageError::Sqlx)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.busy_timeout_seconds))
            .connect(&database_url)
            .await
            .map_err(StorageError::Sqlx)?;

        if config.enable_wal {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await
                .map_err(StorageError::Sqlx)?;
        }

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not created here.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `project_files` table if it does not exist yet
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS project_files (
                project_id TEXT NOT NULL,
                path TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (project_id, path)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// Insert or replace a single file
    pub async fn upsert_file(&self, project_id: &str, path: &str, content: &str) -> StorageResult<()> {
        if project_id.trim().is_empty() {
            return Err(StorageError::InvalidInput(
                "Project ID cannot be empty".to_string(),
            ));
        }
        if path.trim().is_empty() {
            return Err(StorageError::InvalidInput("File path cannot be empty".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO project_files (project_id, path, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(project_id, path) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(path)
        .bind(content)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(())
    }

    /// Flatten a generated structure tree and store every file in it.
    ///
    /// Returns the number of files written.
    pub async fn save_structure(
        &self,
        project_id: &str,
        structure: &[StructureNode],
    ) -> StorageResult<usize> {
        let files = flatten_structure(structure);
        for file in &files {
            self.upsert_file(project_id, &normalize_project_path(&file.path), &file.content)
                .await?;
        }

        info!(
            "Saved {} generated files for project {}",
            files.len(),
            project_id
        );
        Ok(files.len())
    }

    /// Remove every stored file for a project, returning how many were deleted
    pub async fn delete_project_files(&self, project_id: &str) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM project_files WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FileStore for SqliteFileStore {
    async fn list_files(&self, project_id: &str) -> StorageResult<Vec<StoredFile>> {
        let files = sqlx::query_as::<_, StoredFile>(
            "SELECT project_id, path, content FROM project_files WHERE project_id = ? ORDER BY path",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Loaded {} files for project {}", files.len(), project_id);
        Ok(files)
    }
}
