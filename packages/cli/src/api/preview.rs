use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use codexa_preview::{PreviewController, PreviewLog, PreviewStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiResult, AppError};

/// Largest page of log entries a single request may ask for
const MAX_LOG_LIMIT: usize = 1000;

/// Shared state for preview endpoints
#[derive(Clone)]
pub struct PreviewState {
    pub controller: PreviewController,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartPreviewResponse {
    pub ok: bool,
    pub project_id: String,
    pub frontend: String,
    pub backend: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopPreviewResponse {
    pub ok: bool,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub ok: bool,
    pub logs: Vec<PreviewLog>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Rebuild the workspace for a project and launch its preview
pub async fn start_full_preview(
    Path(project_id): Path<String>,
    State(state): State<PreviewState>,
) -> ApiResult<Json<StartPreviewResponse>> {
    info!("Starting preview for project: {}", project_id);

    let urls = state.controller.start_preview(&project_id).await?;

    Ok(Json(StartPreviewResponse {
        ok: true,
        project_id,
        frontend: urls.frontend,
        backend: urls.backend,
    }))
}

/// Stop whatever preview is running. The project id is informational only.
pub async fn stop_preview(
    Path(project_id): Path<String>,
    State(state): State<PreviewState>,
) -> Json<StopPreviewResponse> {
    info!("Stopping preview (requested for project: {})", project_id);

    state.controller.stop_current_preview().await;

    Json(StopPreviewResponse {
        ok: true,
        status: "stopped".to_string(),
    })
}

pub async fn preview_status(State(state): State<PreviewState>) -> Json<PreviewStatus> {
    Json(state.controller.status().await)
}

/// Query parameters for getting preview logs
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn get_preview_logs(
    Query(query): Query<LogsQuery>,
    State(state): State<PreviewState>,
) -> ApiResult<Json<LogsResponse>> {
    if let Some(limit) = query.limit {
        if limit == 0 || limit > MAX_LOG_LIMIT {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {}",
                MAX_LOG_LIMIT
            )));
        }
    }

    let logs = state.controller.logs(query.since, query.limit).await;
    Ok(Json(LogsResponse { ok: true, logs }))
}

pub async fn clear_preview_logs(State(state): State<PreviewState>) -> Json<OkResponse> {
    state.controller.clear_logs().await;
    Json(OkResponse { ok: true })
}
