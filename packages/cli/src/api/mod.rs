use axum::{
    routing::{get, post},
    Router,
};
use codexa_preview::PreviewController;

pub mod files;
pub mod health;
pub mod preview;

use files::FilesState;
use preview::PreviewState;

/// Build the API router around an existing preview controller
pub fn create_router(controller: PreviewController) -> Router {
    let files_state = FilesState {
        store: controller.store(),
    };
    let preview_state = PreviewState { controller };

    let preview_router = Router::new()
        .route("/full/{project_id}", post(preview::start_full_preview))
        .route("/stop/{project_id}", post(preview::stop_preview))
        .route("/status", get(preview::preview_status))
        .route("/logs", get(preview::get_preview_logs))
        .route("/logs/clear", post(preview::clear_preview_logs))
        .with_state(preview_state);

    let files_router = Router::new()
        .route("/{project_id}", get(files::get_project_files))
        .with_state(files_state);

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/preview", preview_router)
        .nest("/files", files_router)
}
