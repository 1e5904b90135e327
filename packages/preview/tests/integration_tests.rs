// ABOUTME: End-to-end preview lifecycle tests against real child processes
// ABOUTME: Uses sh/sleep stand-ins for the dev servers and ephemeral ports

#![cfg(unix)]

use codexa_preview::{
    CommandSpec, HealOutcome, PreviewConfig, PreviewController, PreviewError, PreviewPorts,
    PreviewStatus, ProcessTable, Role, SystemProcessTable,
};
use codexa_storage::{InMemoryFileStore, StoredFile};
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", ["-c", script])
}

fn test_config(root: &Path) -> PreviewConfig {
    PreviewConfig {
        scratch_root: root.to_path_buf(),
        ports: PreviewPorts {
            frontend: free_port(),
            backend: free_port(),
        },
        frontend_command: sh("sleep 30"),
        backend_command: sh("sleep 30"),
        install_command: sh("true"),
        install_on_start: false,
        heal_window: Duration::from_secs(1),
        install_timeout: Duration::from_secs(10),
        ..PreviewConfig::default()
    }
}

fn full_project(project_id: &str) -> Vec<StoredFile> {
    vec![
        StoredFile::new(project_id, "frontend/index.html", "<div id=\"root\"></div>"),
        StoredFile::new(project_id, "frontend/src/main.tsx", "createRoot(root)"),
        StoredFile::new(project_id, "backend/main.py", "app = FastAPI()"),
    ]
}

fn controller(config: PreviewConfig, files: Vec<StoredFile>) -> PreviewController {
    PreviewController::new(
        config,
        Arc::new(InMemoryFileStore::with_files(files)),
        Arc::new(SystemProcessTable::new()),
    )
}

/// Pids of live processes whose working directory is inside `dir`
fn processes_in(dir: &Path) -> Vec<u32> {
    SystemProcessTable::new()
        .list_processes()
        .unwrap()
        .into_iter()
        .filter(|p| p.cwd.as_deref().is_some_and(|cwd| cwd.starts_with(dir)))
        .map(|p| p.pid)
        .collect()
}

async fn wait_until_empty(dir: &Path) -> Vec<u32> {
    let mut remaining = processes_in(dir);
    for _ in 0..50 {
        if remaining.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        remaining = processes_in(dir);
    }
    remaining
}

#[tokio::test]
#[serial]
async fn test_start_materializes_and_runs_both_roles() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let ports = config.ports;
    let controller = controller(config, full_project("P1"));

    let urls = controller.start_preview("P1").await.unwrap();
    assert_eq!(urls.frontend, format!("http://localhost:{}", ports.frontend));
    assert_eq!(urls.backend, format!("http://localhost:{}", ports.backend));

    let workspace = temp.path().join("P1");
    assert_eq!(
        std::fs::read_to_string(workspace.join("frontend/src/main.tsx")).unwrap(),
        "createRoot(root)"
    );
    assert!(workspace.join("backend/main.py").is_file());

    assert_eq!(
        controller.status().await,
        PreviewStatus::Running {
            project_id: "P1".to_string(),
            frontend_port: ports.frontend,
            backend_port: ports.backend,
        }
    );

    let session = controller.current_session().await.unwrap();
    #[cfg(target_os = "linux")]
    {
        let cwd_of = |pid: u32| std::fs::read_link(format!("/proc/{}/cwd", pid)).unwrap();
        assert_eq!(cwd_of(session.backend_pid.unwrap()), workspace.join("backend"));
        assert_eq!(cwd_of(session.frontend_pid.unwrap()), workspace.join("frontend"));
    }

    controller.stop_current_preview().await;
    assert_eq!(controller.status().await, PreviewStatus::Idle);
    #[cfg(target_os = "linux")]
    assert!(wait_until_empty(&workspace).await.is_empty());
}

#[tokio::test]
#[serial]
async fn test_missing_frontend_fails_without_launching() {
    let temp = TempDir::new().unwrap();
    let files = vec![StoredFile::new("P2", "backend/main.py", "app = FastAPI()")];
    let controller = controller(test_config(temp.path()), files);

    let err = controller.start_preview("P2").await.unwrap_err();
    assert!(matches!(
        err,
        PreviewError::EmptyWorkspace {
            root: Role::Frontend,
            ..
        }
    ));
    assert_eq!(err.to_string(), "No frontend files found for project P2");
    assert_eq!(controller.status().await, PreviewStatus::Idle);
    assert!(processes_in(&temp.path().join("P2")).is_empty());
}

#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn test_switching_projects_leaves_nothing_in_old_workspace() {
    let temp = TempDir::new().unwrap();
    let mut files = full_project("A");
    files.extend(full_project("B"));
    let controller = controller(test_config(temp.path()), files);

    controller.start_preview("A").await.unwrap();
    let workspace_a: PathBuf = temp.path().join("A");
    assert!(!processes_in(&workspace_a).is_empty());

    controller.start_preview("B").await.unwrap();
    assert_eq!(wait_until_empty(&workspace_a).await, Vec::<u32>::new());
    assert!(!processes_in(&temp.path().join("B")).is_empty());

    controller.stop_current_preview().await;
    assert!(wait_until_empty(&temp.path().join("B")).await.is_empty());
}

#[tokio::test]
#[serial]
async fn test_stop_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let controller = controller(test_config(temp.path()), full_project("P1"));

    controller.stop_current_preview().await;
    assert_eq!(controller.status().await, PreviewStatus::Idle);

    controller.start_preview("P1").await.unwrap();
    controller.stop_current_preview().await;
    controller.stop_current_preview().await;
    assert_eq!(controller.status().await, PreviewStatus::Idle);
}

#[tokio::test]
#[serial]
async fn test_restart_same_project_keeps_files_identical() {
    let temp = TempDir::new().unwrap();
    let controller = controller(test_config(temp.path()), full_project("P1"));

    controller.start_preview("P1").await.unwrap();
    let first = std::fs::read(temp.path().join("P1/frontend/index.html")).unwrap();
    controller.start_preview("P1").await.unwrap();
    let second = std::fs::read(temp.path().join("P1/frontend/index.html")).unwrap();
    assert_eq!(first, second);

    controller.stop_current_preview().await;
}

#[tokio::test]
#[serial]
async fn test_missing_dependency_heals_exactly_once() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    // Every launch, including the relaunch, reports the same missing module
    config.frontend_command = sh("echo \"Error: Cannot find module 'react'\" >&2; sleep 30");
    config.install_command = sh("echo run >> installs.log");
    config.heal_window = Duration::from_secs(5);
    let controller = controller(config, full_project("P1"));

    controller.start_preview("P1").await.unwrap();
    let watcher = controller.take_heal_watcher().await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(15), watcher)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, HealOutcome::Healed);

    // Give the relaunched frontend time to print the signature again
    tokio::time::sleep(Duration::from_millis(500)).await;
    let installs =
        std::fs::read_to_string(temp.path().join("P1/frontend/installs.log")).unwrap();
    assert_eq!(installs.lines().count(), 1);

    assert!(controller
        .logs(None, None)
        .await
        .iter()
        .any(|l| l.message.starts_with("Frontend relaunched after reinstall")));

    controller.stop_current_preview().await;
    assert_eq!(controller.status().await, PreviewStatus::Idle);
}

#[tokio::test]
#[serial]
async fn test_launch_failure_leaves_controller_idle() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.frontend_command = CommandSpec::new("codexa-no-such-dev-server", ["--port", "{port}"]);
    let controller = controller(config, full_project("P1"));

    let err = controller.start_preview("P1").await.unwrap_err();
    assert!(matches!(
        err,
        PreviewError::Launch {
            role: Role::Frontend,
            ..
        }
    ));
    assert_eq!(controller.status().await, PreviewStatus::Idle);
    #[cfg(target_os = "linux")]
    assert!(wait_until_empty(&temp.path().join("P1")).await.is_empty());
}
