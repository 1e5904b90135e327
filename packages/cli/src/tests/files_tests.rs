use crate::api;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use codexa_preview::{PreviewConfig, PreviewController, SystemProcessTable};
use codexa_storage::{InMemoryFileStore, StoredFile};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app(temp: &TempDir, files: Vec<StoredFile>) -> Router {
    let config = PreviewConfig {
        scratch_root: temp.path().to_path_buf(),
        ..PreviewConfig::default()
    };
    // No preview is started here, so the real process table is never touched
    let controller = PreviewController::new(
        config,
        Arc::new(InMemoryFileStore::with_files(files)),
        Arc::new(SystemProcessTable::new()),
    );
    api::create_router(controller)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_lists_project_files() {
    let temp = TempDir::new().unwrap();
    let app = test_app(
        &temp,
        vec![
            StoredFile::new("p1", "frontend/index.html", "<div id=\"root\"></div>"),
            StoredFile::new("p1", "backend/main.py", "app = FastAPI()"),
            StoredFile::new("p2", "frontend/index.html", "<p>other</p>"),
        ],
    );

    let (status, body) = get(&app, "/files/p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let mut files = body["files"].as_array().unwrap().clone();
    files.sort_by_key(|f| f["path"].as_str().unwrap().to_string());
    assert_eq!(
        files,
        vec![
            json!({ "path": "backend/main.py", "content": "app = FastAPI()" }),
            json!({ "path": "frontend/index.html", "content": "<div id=\"root\"></div>" }),
        ]
    );
}

#[tokio::test]
async fn test_project_without_files_is_404() {
    let temp = TempDir::new().unwrap();
    let app = test_app(
        &temp,
        vec![StoredFile::new("p1", "frontend/index.html", "<html/>")],
    );

    let (status, body) = get(&app, "/files/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unsafe_project_id_is_400() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp, Vec::new());

    let (status, body) = get(&app, "/files/a..b").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_PROJECT_ID");
}
