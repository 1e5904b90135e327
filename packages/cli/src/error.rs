use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use codexa_preview::PreviewError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Main application error type that all handlers should return
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found")]
    NotFound,

    #[error(transparent)]
    Preview(#[from] PreviewError),
}

/// Structured error response format for API consistency
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: ErrorDetail,
    request_id: String,
}

/// Error detail structure with machine-readable codes
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl AppError {
    /// Convert AppError to appropriate HTTP status code and error code
    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Preview(preview_error) => match preview_error {
                PreviewError::InvalidProjectId { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_PROJECT_ID")
                }
                PreviewError::EmptyWorkspace { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_WORKSPACE")
                }
                PreviewError::Launch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "LAUNCH_FAILED"),
                PreviewError::Cancelled { .. } => (StatusCode::CONFLICT, "CANCELLED"),
                PreviewError::FileStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
                PreviewError::Io(_) | PreviewError::Serde(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }

    /// Get user-friendly error message (sanitized for external consumption)
    fn to_user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Validation failed: {}", msg),
            AppError::NotFound => "The requested resource was not found".to_string(),
            AppError::Preview(preview_error) => match preview_error {
                PreviewError::InvalidProjectId { reason, .. } => {
                    format!("Invalid project ID: {}", reason)
                }
                PreviewError::EmptyWorkspace { .. } | PreviewError::Cancelled { .. } => {
                    preview_error.to_string()
                }
                PreviewError::Launch { role, .. } => {
                    format!("Failed to launch the {} preview process", role)
                }
                PreviewError::FileStore(_) => "Data storage error".to_string(),
                PreviewError::Io(_) | PreviewError::Serde(_) => {
                    "An internal server error occurred".to_string()
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();
        let user_message = self.to_user_message();

        // Log server-side failures with full context but don't expose details
        if status_code.is_server_error() {
            error!(
                request_id = %request_id,
                error_code = %error_code,
                error = %self,
                "Preview request failed"
            );
        } else {
            tracing::info!(
                request_id = %request_id,
                error_code = %error_code,
                error = %self,
                "API error response"
            );
        }

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: user_message,
            },
            request_id,
        };

        let mut response = Json(error_response).into_response();
        *response.status_mut() = status_code;
        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
