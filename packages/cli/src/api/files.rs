use axum::{
    extract::{Path, State},
    response::Json,
};
use codexa_preview::{validate_project_id, PreviewError};
use codexa_storage::FileStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ApiResult, AppError};

/// Shared state for file endpoints
#[derive(Clone)]
pub struct FilesState {
    pub store: Arc<dyn FileStore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFilesResponse {
    pub ok: bool,
    pub files: Vec<ProjectFile>,
}

/// Every stored file for a project. A project with no files is a 404.
pub async fn get_project_files(
    Path(project_id): Path<String>,
    State(state): State<FilesState>,
) -> ApiResult<Json<ProjectFilesResponse>> {
    validate_project_id(&project_id)?;

    let files = state
        .store
        .list_files(&project_id)
        .await
        .map_err(PreviewError::from)?;
    if files.is_empty() {
        return Err(AppError::NotFound);
    }
    debug!("Serving {} files for project {}", files.len(), project_id);

    Ok(Json(ProjectFilesResponse {
        ok: true,
        files: files
            .into_iter()
            .map(|file| ProjectFile {
                path: file.path,
                content: file.content,
            })
            .collect(),
    }))
}
