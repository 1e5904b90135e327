// ABOUTME: Owns the running backend/frontend pair for the single preview session
// ABOUTME: Launches, tracks, and terminates the children and arms the dependency healer

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PreviewConfig;
use crate::healer::{DependencyHealer, HealOutcome};
use crate::logs::SessionLogs;
use crate::process::{run_install, spawn_role, TrackedProcess};
use crate::types::{
    PreviewError, PreviewPorts, PreviewResult, ProjectWorkspace, Role, SupervisorState,
};

/// The frontend child plus the generation it belongs to. Shared with the
/// healer, which swaps the process when it relaunches.
#[derive(Debug, Default)]
pub struct FrontendSlot {
    pub generation: u64,
    pub process: Option<TrackedProcess>,
}

pub type SharedFrontendSlot = Arc<Mutex<FrontendSlot>>;

/// What a successful `start` launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub generation: u64,
    pub frontend_pid: u32,
    pub backend_pid: u32,
}

/// Fires once a stop is requested after the ticket it was created with.
/// The controller bumps the ticket on every stop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tickets: watch::Receiver<u64>,
    ticket: u64,
}

impl StopSignal {
    pub fn new(tickets: watch::Receiver<u64>, ticket: u64) -> Self {
        Self { tickets, ticket }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, tickets) = watch::channel(0);
        Self { tickets, ticket: 0 }
    }

    pub fn is_requested(&self) -> bool {
        *self.tickets.borrow() != self.ticket
    }

    /// Wait until a stop is requested. Pends forever once the sender is gone.
    pub async fn requested(&mut self) {
        let ticket = self.ticket;
        if self.tickets.wait_for(|t| *t != ticket).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn needs_install(frontend_dir: &Path) -> bool {
    let has_manifest = tokio::fs::try_exists(frontend_dir.join("package.json"))
        .await
        .unwrap_or(false);
    let has_modules = tokio::fs::try_exists(frontend_dir.join("node_modules"))
        .await
        .unwrap_or(false);
    has_manifest && !has_modules
}

pub struct ProcessSupervisor {
    config: PreviewConfig,
    logs: SessionLogs,
    state: SupervisorState,
    generation: u64,
    backend: Option<TrackedProcess>,
    frontend: SharedFrontendSlot,
    heal_watcher: Option<JoinHandle<HealOutcome>>,
}

impl ProcessSupervisor {
    pub fn new(config: PreviewConfig, logs: SessionLogs) -> Self {
        Self {
            config,
            logs,
            state: SupervisorState::Idle,
            generation: 0,
            backend: None,
            frontend: Arc::new(Mutex::new(FrontendSlot::default())),
            heal_watcher: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn backend_pid(&self) -> Option<u32> {
        self.backend.as_ref().map(TrackedProcess::pid)
    }

    pub async fn frontend_pid(&self) -> Option<u32> {
        self.frontend.lock().await.process.as_ref().map(TrackedProcess::pid)
    }

    /// The slot the healer swaps the frontend in; stable for the
    /// supervisor's lifetime
    pub fn frontend_slot(&self) -> SharedFrontendSlot {
        Arc::clone(&self.frontend)
    }

    /// Hand over the healer armed by the last `start`, if any
    pub fn take_heal_watcher(&mut self) -> Option<JoinHandle<HealOutcome>> {
        self.heal_watcher.take()
    }

    async fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.frontend.lock().await.generation = self.generation;
        self.generation
    }

    /// Launch backend then frontend for `workspace`, stopping whatever ran
    /// before. Returns once both processes are spawned; readiness is not
    /// awaited.
    ///
    /// A dependency install run here is abandoned as soon as `stop_signal`
    /// fires, returning `Cancelled`. On error, anything already launched
    /// stays tracked until `stop`.
    pub async fn start(
        &mut self,
        workspace: &ProjectWorkspace,
        ports: PreviewPorts,
        mut stop_signal: StopSignal,
    ) -> PreviewResult<SessionHandle> {
        self.stop().await;

        self.state = SupervisorState::Starting;
        let generation = self.bump_generation().await;

        let (backend, _) = spawn_role(
            Role::Backend,
            &self.config.backend_command,
            &workspace.backend_dir(),
            ports.backend,
            &self.logs,
            false,
        )?;
        let backend_pid = backend.pid();
        self.backend = Some(backend);

        let frontend_dir = workspace.frontend_dir();
        if self.config.install_on_start && needs_install(&frontend_dir).await {
            // Dropping the install future kills the install command
            tokio::select! {
                result = run_install(
                    &self.config.install_command,
                    &frontend_dir,
                    self.config.install_timeout,
                    &self.logs,
                ) => {
                    result.map_err(|e| PreviewError::Launch {
                        role: Role::Frontend,
                        command: self.config.install_command.to_string(),
                        reason: e.to_string(),
                    })?;
                }
                _ = stop_signal.requested() => {
                    info!(
                        "Dependency install for {} abandoned, stop requested",
                        workspace.project_id
                    );
                    return Err(PreviewError::Cancelled {
                        project_id: workspace.project_id.clone(),
                    });
                }
            }
        }

        let (frontend, tap) = spawn_role(
            Role::Frontend,
            &self.config.frontend_command,
            &frontend_dir,
            ports.frontend,
            &self.logs,
            true,
        )?;
        let frontend_pid = frontend.pid();
        self.frontend.lock().await.process = Some(frontend);

        if let Some(tap) = tap {
            let healer = DependencyHealer {
                generation,
                slot: Arc::clone(&self.frontend),
                frontend_dir,
                port: ports.frontend,
                frontend_command: self.config.frontend_command.clone(),
                install_command: self.config.install_command.clone(),
                window: self.config.heal_window,
                install_timeout: self.config.install_timeout,
                logs: self.logs.clone(),
                lock_path: self.config.lock_path(),
            };
            self.heal_watcher = Some(healer.watch(tap));
        }

        self.state = SupervisorState::Running;
        info!(
            "Preview generation {} running for {} (frontend pid {}, backend pid {})",
            generation, workspace.project_id, frontend_pid, backend_pid
        );

        Ok(SessionHandle {
            generation,
            frontend_pid,
            backend_pid,
        })
    }

    /// SIGTERM every tracked child's process group and forget them.
    /// Stopping an idle supervisor does nothing beyond invalidating watchers.
    pub async fn stop(&mut self) {
        let was_idle = self.state == SupervisorState::Idle;
        self.state = SupervisorState::Stopping;
        let generation = self.bump_generation().await;

        let frontend = self.frontend.lock().await.process.take();
        let backend = self.backend.take();
        // Dropping the handle detaches the watcher; its generation is now stale.
        self.heal_watcher = None;

        let had_children = frontend.is_some() || backend.is_some();
        for process in [frontend, backend].into_iter().flatten() {
            process.terminate();
        }

        if had_children || !was_idle {
            info!("Preview processes stopped (generation {})", generation);
        }
        self.state = SupervisorState::Idle;
    }
}
