// ABOUTME: Writes a project's stored files into its scratch workspace
// ABOUTME: One directory per (project, logical root), overwritten on every preview start

use codexa_storage::StoredFile;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::types::{PreviewError, PreviewResult, ProjectWorkspace, Role};

/// Validate project_id to prevent path traversal attacks
///
/// Project IDs must contain only alphanumeric characters, hyphens, and underscores.
/// They become a path segment under the scratch root, so anything else could
/// escape it.
pub fn validate_project_id(project_id: &str) -> PreviewResult<()> {
    if project_id.is_empty() {
        return Err(PreviewError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason: "Project ID cannot be empty".to_string(),
        });
    }

    if project_id.contains("..") || project_id.contains('/') || project_id.contains('\\') {
        return Err(PreviewError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason: "Project ID cannot contain path traversal sequences (.. / \\)".to_string(),
        });
    }

    if !project_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PreviewError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason: "Project ID can only contain alphanumeric characters, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(())
}

/// Turn `root/some/file` into a safe relative path, or `None` if the stored
/// path would land outside the root directory.
fn relative_path(stored_path: &str, root: Role) -> Option<PathBuf> {
    let rel = stored_path.strip_prefix(root.as_str())?.strip_prefix('/')?;

    let mut out = PathBuf::new();
    for segment in rel.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            segment => {
                let mut components = Path::new(segment).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => out.push(segment),
                    _ => return None,
                }
            }
        }
    }

    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Materializes stored files under `<scratch_root>/<project_id>/<root>/`.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    scratch_root: PathBuf,
}

impl FileMaterializer {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    /// Workspace location for a project. Nothing is created on disk.
    pub fn workspace_for(&self, project_id: &str) -> PreviewResult<ProjectWorkspace> {
        validate_project_id(project_id)?;
        Ok(ProjectWorkspace::new(
            project_id,
            self.scratch_root.join(project_id),
        ))
    }

    /// Write every file under `root/` to the workspace and return the root's
    /// directory.
    ///
    /// Existing files at the same paths are overwritten; anything else already
    /// in the directory (such as `node_modules`) is left alone.
    ///
    /// # Errors
    ///
    /// * `PreviewError::EmptyWorkspace` - no stored file belongs to `root`
    /// * `PreviewError::Io` - a directory or file could not be written
    pub async fn materialize(
        &self,
        project_id: &str,
        root: Role,
        files: &[StoredFile],
    ) -> PreviewResult<PathBuf> {
        let workspace = self.workspace_for(project_id)?;
        let root_dir = workspace.dir_for(root);
        let prefix = format!("{}/", root.as_str());

        let matching: Vec<(PathBuf, &StoredFile)> = files
            .iter()
            .filter(|file| file.path.starts_with(&prefix))
            .filter_map(|file| match relative_path(&file.path, root) {
                Some(rel) => Some((rel, file)),
                None => {
                    warn!(
                        "Skipping unsafe path '{}' for project {}",
                        file.path, project_id
                    );
                    None
                }
            })
            .collect();

        if matching.is_empty() {
            return Err(PreviewError::EmptyWorkspace {
                project_id: project_id.to_string(),
                root,
            });
        }

        fs::create_dir_all(&root_dir).await?;

        for (rel, file) in &matching {
            let target = root_dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&target, file.content.as_bytes()).await?;
            debug!("Materialized {}", target.display());
        }

        info!(
            "Materialized {} {} files for project {} into {}",
            matching.len(),
            root,
            project_id,
            root_dir.display()
        );

        Ok(root_dir)
    }
}
