use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{FileStore, StorageResult, StoredFile};

/// In-process file store, keyed by project id then path.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `files`
    pub fn with_files(files: impl IntoIterator<Item = StoredFile>) -> Self {
        let mut map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for file in files {
            map.entry(file.project_id)
                .or_default()
                .insert(file.path, file.content);
        }
        Self {
            files: RwLock::new(map),
        }
    }

    pub async fn insert(&self, file: StoredFile) {
        let mut files = self.files.write().await;
        files
            .entry(file.project_id)
            .or_default()
            .insert(file.path, file.content);
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn list_files(&self, project_id: &str) -> StorageResult<Vec<StoredFile>> {
        let files = self.files.read().await;
        Ok(files
            .get(project_id)
            .map(|project| {
                project
                    .iter()
                    .map(|(path, content)| StoredFile::new(project_id, path.clone(), content.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
