// ABOUTME: Watches freshly launched frontend output for missing-dependency errors
// ABOUTME: Performs at most one reinstall-and-relaunch cycle per session generation

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::config::CommandSpec;
use crate::lock::{read_lock, write_lock};
use crate::logs::SessionLogs;
use crate::process::{run_install, spawn_role, InstallError, OutputTap};
use crate::supervisor::SharedFrontendSlot;
use crate::types::{HealError, Role};

static MISSING_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)cannot find module|cannot find package|module not found|failed to resolve import",
    )
    .expect("missing dependency pattern is valid")
});

/// Does this output line look like a dependency that was never installed?
pub fn is_missing_dependency(line: &str) -> bool {
    MISSING_DEPENDENCY.is_match(line)
}

/// How a watcher ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// The window closed (or the output ended) without a match
    NoFailureObserved,
    /// Dependencies were reinstalled and the frontend relaunched
    Healed,
    /// A newer session took over; nothing was touched
    Superseded,
    Failed(HealError),
}

/// One-shot watcher bound to a single session generation.
#[derive(Debug, Clone)]
pub struct DependencyHealer {
    pub generation: u64,
    pub slot: SharedFrontendSlot,
    pub frontend_dir: PathBuf,
    pub port: u16,
    pub frontend_command: CommandSpec,
    pub install_command: CommandSpec,
    pub window: Duration,
    pub install_timeout: Duration,
    pub logs: SessionLogs,
    /// Session lock to update with the relaunched frontend pid
    pub lock_path: PathBuf,
}

impl DependencyHealer {
    /// Start watching `tap` in the background
    pub fn watch(self, tap: OutputTap) -> JoinHandle<HealOutcome> {
        tokio::spawn(self.run(tap))
    }

    async fn run(self, mut tap: OutputTap) -> HealOutcome {
        let deadline = Instant::now() + self.window;

        let trigger = loop {
            match timeout_at(deadline, tap.recv()).await {
                Ok(Some(line)) if is_missing_dependency(&line) => break line,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return HealOutcome::NoFailureObserved,
            }
        };
        drop(tap);

        if !self.is_current().await {
            return HealOutcome::Superseded;
        }

        info!(
            "Missing dependency detected in {}: {}",
            self.frontend_dir.display(),
            trigger
        );
        self.logs
            .system(format!("Missing dependency detected, reinstalling: {}", trigger))
            .await;

        match self.heal().await {
            Ok(outcome) => outcome,
            Err(e) => {
                // A stop reaping the workspace kills the install; that is not
                // a failure of this session
                if !self.is_current().await {
                    return HealOutcome::Superseded;
                }
                warn!("Dependency heal failed: {}", e);
                self.logs
                    .system(format!("Dependency heal failed: {}", e))
                    .await;
                self.take_down_frontend().await;
                HealOutcome::Failed(e)
            }
        }
    }

    async fn is_current(&self) -> bool {
        self.slot.lock().await.generation == self.generation
    }

    async fn heal(&self) -> Result<HealOutcome, HealError> {
        remove_dir_if_exists(self.frontend_dir.join("node_modules")).await?;
        remove_file_if_exists(self.frontend_dir.join("package-lock.json")).await?;

        run_install(
            &self.install_command,
            &self.frontend_dir,
            self.install_timeout,
            &self.logs,
        )
        .await
        .map_err(|e| match e {
            InstallError::Timeout { secs, .. } => HealError::Timeout { secs },
            other => HealError::Reinstall {
                reason: other.to_string(),
            },
        })?;

        let mut slot = self.slot.lock().await;
        if slot.generation != self.generation {
            return Ok(HealOutcome::Superseded);
        }

        if let Some(old) = slot.process.take() {
            old.terminate();
        }

        let (replacement, _) = spawn_role(
            Role::Frontend,
            &self.frontend_command,
            &self.frontend_dir,
            self.port,
            &self.logs,
            false,
        )
        .map_err(|e| HealError::Relaunch {
            reason: e.to_string(),
        })?;

        info!(
            "Frontend relaunched after reinstall: '{}' (pid {})",
            replacement.command(),
            replacement.pid()
        );
        self.logs
            .system(format!(
                "Frontend relaunched after reinstall (pid {})",
                replacement.pid()
            ))
            .await;
        self.record_frontend_pid(replacement.pid()).await;
        slot.process = Some(replacement);

        Ok(HealOutcome::Healed)
    }

    /// Point the session lock at the replacement. Called with the slot held.
    async fn record_frontend_pid(&self, pid: u32) {
        let Some(mut lock) = read_lock(&self.lock_path).await else {
            return;
        };
        lock.frontend_pid = Some(pid);
        if let Err(e) = write_lock(&self.lock_path, &lock).await {
            warn!("Failed to update session lock after relaunch: {}", e);
        }
    }

    async fn take_down_frontend(&self) {
        let mut slot = self.slot.lock().await;
        if slot.generation == self.generation {
            if let Some(process) = slot.process.take() {
                process.terminate();
            }
        }
    }
}

async fn remove_dir_if_exists(path: PathBuf) -> Result<(), HealError> {
    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HealError::Io(format!("{}: {}", path.display(), e))),
    }
}

async fn remove_file_if_exists(path: PathBuf) -> Result<(), HealError> {
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HealError::Io(format!("{}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::SessionLock;
    use crate::supervisor::FrontendSlot;
    use crate::types::PreviewPorts;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::{mpsc, Mutex};

    #[test]
    fn test_signature_variants() {
        assert!(is_missing_dependency(
            "Error: Cannot find module 'react-dom/client'"
        ));
        assert!(is_missing_dependency("Error [ERR_MODULE_NOT_FOUND]: Cannot find package 'vite'"));
        assert!(is_missing_dependency("Module not found: Can't resolve 'axios'"));
        assert!(is_missing_dependency(
            "[vite] Internal server error: Failed to resolve import \"zustand\""
        ));
        assert!(is_missing_dependency("CANNOT FIND MODULE x"));
        assert!(!is_missing_dependency("VITE v5.0.0  ready in 300 ms"));
    }

    fn healer(temp: &TempDir, slot: SharedFrontendSlot, install: &str) -> DependencyHealer {
        DependencyHealer {
            generation: 1,
            slot,
            frontend_dir: temp.path().to_path_buf(),
            port: 0,
            frontend_command: CommandSpec::new("sh", ["-c", "sleep 5"]),
            install_command: CommandSpec::new("sh", ["-c", install]),
            window: Duration::from_secs(2),
            install_timeout: Duration::from_secs(5),
            logs: SessionLogs::new(),
            lock_path: temp.path().join("preview-lock.json"),
        }
    }

    fn slot(generation: u64) -> SharedFrontendSlot {
        Arc::new(Mutex::new(FrontendSlot {
            generation,
            process: None,
        }))
    }

    #[tokio::test]
    async fn test_quiet_output_observes_nothing() {
        let temp = TempDir::new().unwrap();
        let mut healer = healer(&temp, slot(1), "touch installed");
        healer.window = Duration::from_millis(100);
        let (_tx, rx) = mpsc::channel(8);

        assert_eq!(healer.watch(rx).await.unwrap(), HealOutcome::NoFailureObserved);
        assert!(!temp.path().join("installed").exists());
    }

    #[tokio::test]
    async fn test_superseded_healer_skips_install() {
        let temp = TempDir::new().unwrap();
        let healer = healer(&temp, slot(2), "touch installed");
        let (tx, rx) = mpsc::channel(8);
        tx.send("Error: Cannot find module 'vite'".to_string())
            .await
            .unwrap();

        assert_eq!(healer.watch(rx).await.unwrap(), HealOutcome::Superseded);
        assert!(!temp.path().join("installed").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_heal_reinstalls_and_relaunches() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("node_modules/stale")).unwrap();
        std::fs::write(temp.path().join("package-lock.json"), "{}").unwrap();

        let shared = slot(1);
        let healer = healer(&temp, shared.clone(), "echo run >> installs");
        let (tx, rx) = mpsc::channel(8);
        tx.send("Cannot find module 'react'".to_string()).await.unwrap();

        assert_eq!(healer.watch(rx).await.unwrap(), HealOutcome::Healed);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("installs")).unwrap(),
            "run\n"
        );
        assert!(!temp.path().join("node_modules/stale").exists());
        assert!(!temp.path().join("package-lock.json").exists());

        let process = shared.lock().await.process.take().expect("replacement frontend");
        process.terminate();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_heal_records_replacement_pid_in_lock() {
        let temp = TempDir::new().unwrap();
        let shared = slot(1);
        let healer = healer(&temp, shared.clone(), "true");
        let lock_path = healer.lock_path.clone();
        write_lock(
            &lock_path,
            &SessionLock {
                project_id: "p1".to_string(),
                workspace_root: temp.path().to_path_buf(),
                ports: PreviewPorts {
                    frontend: 5959,
                    backend: 7979,
                },
                frontend_pid: Some(1),
                backend_pid: Some(2),
                started_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

        let (tx, rx) = mpsc::channel(8);
        tx.send("Cannot find package 'vite'".to_string()).await.unwrap();
        assert_eq!(healer.watch(rx).await.unwrap(), HealOutcome::Healed);

        let process = shared.lock().await.process.take().expect("replacement frontend");
        let lock = read_lock(&lock_path).await.unwrap();
        assert_eq!(lock.frontend_pid, Some(process.pid()));
        assert_eq!(lock.backend_pid, Some(2));
        process.terminate();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_killed_by_stop_is_superseded() {
        let temp = TempDir::new().unwrap();
        let shared = slot(1);
        let healer = healer(&temp, shared.clone(), "sleep 1; exit 1");
        let logs = healer.logs.clone();
        let (tx, rx) = mpsc::channel(8);
        tx.send("Cannot find module 'vite'".to_string()).await.unwrap();

        let watcher = healer.watch(rx);
        tokio::time::sleep(Duration::from_millis(300)).await;
        // A stop bumps the generation while the install is still running
        shared.lock().await.generation = 2;

        assert_eq!(watcher.await.unwrap(), HealOutcome::Superseded);
        assert!(!logs
            .get(None, None)
            .await
            .iter()
            .any(|l| l.message.starts_with("Dependency heal failed")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_install_leaves_frontend_down() {
        let temp = TempDir::new().unwrap();
        let shared = slot(1);
        let healer = healer(&temp, shared.clone(), "exit 1");
        let logs = healer.logs.clone();
        let (tx, rx) = mpsc::channel(8);
        tx.send("Module not found: x".to_string()).await.unwrap();

        let outcome = healer.watch(rx).await.unwrap();
        assert!(matches!(
            outcome,
            HealOutcome::Failed(HealError::Reinstall { .. })
        ));
        assert!(shared.lock().await.process.is_none());
        assert!(logs
            .get(None, None)
            .await
            .iter()
            .any(|l| l.message.starts_with("Dependency heal failed")));
    }
}
