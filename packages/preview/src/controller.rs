// ABOUTME: Entry point for preview operations: start, stop, status, logs
// ABOUTME: Serializes lifecycle changes and keeps a lock-free status snapshot

use chrono::{DateTime, Utc};
use codexa_storage::FileStore;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PreviewConfig;
use crate::healer::HealOutcome;
use crate::lock::{read_lock, remove_lock, write_lock, SessionLock};
use crate::logs::SessionLogs;
use crate::materializer::{validate_project_id, FileMaterializer};
use crate::ports::PortRegistry;
use crate::reaper::{OrphanReaper, ProcessTable};
use crate::process::TrackedProcess;
use crate::supervisor::{ProcessSupervisor, SharedFrontendSlot, StopSignal};
use crate::types::{
    PreviewError, PreviewLog, PreviewResult, PreviewSession, PreviewStatus, PreviewUrls,
    ProjectWorkspace, Role, SupervisorState,
};

struct ControllerState {
    supervisor: ProcessSupervisor,
    /// Workspace the next stop should sweep, even if its handles are gone
    last_workspace: Option<ProjectWorkspace>,
}

struct Inner {
    config: PreviewConfig,
    store: Arc<dyn FileStore>,
    materializer: FileMaterializer,
    ports: PortRegistry,
    reaper: OrphanReaper,
    logs: SessionLogs,
    state: Mutex<ControllerState>,
    session: RwLock<Option<PreviewSession>>,
    /// Same slot the supervisor and healer use; read for the live frontend pid
    frontend: SharedFrontendSlot,
    /// Bumped by every stop so an in-flight start can notice and bail out
    stop_tickets: watch::Sender<u64>,
}

/// Cheap-to-clone handle to the single preview session.
#[derive(Clone)]
pub struct PreviewController {
    inner: Arc<Inner>,
}

impl PreviewController {
    pub fn new(
        config: PreviewConfig,
        store: Arc<dyn FileStore>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        let logs = SessionLogs::new();
        let supervisor = ProcessSupervisor::new(config.clone(), logs.clone());
        let frontend = supervisor.frontend_slot();
        let (stop_tickets, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                materializer: FileMaterializer::new(&config.scratch_root),
                ports: PortRegistry::new(&config.host, config.ports),
                reaper: OrphanReaper::new(table),
                config,
                store,
                logs,
                state: Mutex::new(ControllerState {
                    supervisor,
                    last_workspace: None,
                }),
                session: RwLock::new(None),
                frontend,
                stop_tickets,
            }),
        }
    }

    /// Create a controller and adopt the workspace recorded by a previous
    /// run's lock file, so the next stop sweeps it.
    pub async fn new_with_recovery(
        config: PreviewConfig,
        store: Arc<dyn FileStore>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        let controller = Self::new(config, store, table);

        if let Some(lock) = read_lock(&controller.inner.config.lock_path()).await {
            info!(
                "Found leftover preview session for project {} at {:?}",
                lock.project_id, lock.workspace_root
            );
            controller.inner.state.lock().await.last_workspace = Some(lock.workspace());
            controller
                .inner
                .logs
                .system(format!(
                    "Recovered previous preview session for project {}",
                    lock.project_id
                ))
                .await;
        }

        controller
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.inner.config
    }

    /// The file store previews are materialized from
    pub fn store(&self) -> Arc<dyn FileStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn urls(&self) -> PreviewUrls {
        self.inner.ports.urls()
    }

    fn check_ticket(&self, ticket: u64, project_id: &str) -> PreviewResult<()> {
        if *self.inner.stop_tickets.borrow() != ticket {
            info!("Preview start for {} cancelled by stop", project_id);
            return Err(PreviewError::Cancelled {
                project_id: project_id.to_string(),
            });
        }
        Ok(())
    }

    /// Materialize `project_id` and launch its frontend and backend, replacing
    /// whatever preview was running.
    ///
    /// # Errors
    ///
    /// * `InvalidProjectId` - the id is not a safe path segment
    /// * `FileStore` - listing the project's files failed
    /// * `EmptyWorkspace` - the project has no frontend or no backend files
    /// * `Launch` - a process failed to spawn; the controller is left idle
    /// * `Cancelled` - `stop_current_preview` was called while starting
    pub async fn start_preview(&self, project_id: &str) -> PreviewResult<PreviewUrls> {
        validate_project_id(project_id)?;
        let ticket = *self.inner.stop_tickets.borrow();

        let mut state = self.inner.state.lock().await;
        self.check_ticket(ticket, project_id)?;

        self.teardown(&mut state).await;
        self.inner
            .logs
            .system(format!("Starting preview for project {}", project_id))
            .await;

        let files = self.inner.store.list_files(project_id).await?;
        let workspace = self.inner.materializer.workspace_for(project_id)?;
        for root in [Role::Frontend, Role::Backend] {
            if let Err(e) = self
                .inner
                .materializer
                .materialize(project_id, root, &files)
                .await
            {
                self.inner.logs.system(e.to_string()).await;
                return Err(e);
            }
        }
        self.check_ticket(ticket, project_id)?;

        let ports = self.inner.ports.ports();
        state.last_workspace = Some(workspace.clone());

        let stop_signal = StopSignal::new(self.inner.stop_tickets.subscribe(), ticket);
        let handle = match state.supervisor.start(&workspace, ports, stop_signal).await {
            Ok(handle) => handle,
            Err(e) => {
                if !matches!(e, PreviewError::Cancelled { .. }) {
                    warn!("Preview launch for {} failed: {}", project_id, e);
                    self.inner.logs.system(e.to_string()).await;
                }
                self.teardown(&mut state).await;
                return Err(e);
            }
        };

        if let Err(e) = self.check_ticket(ticket, project_id) {
            self.teardown(&mut state).await;
            return Err(e);
        }

        let mut session = PreviewSession {
            project_id: project_id.to_string(),
            workspace,
            ports,
            status: SupervisorState::Running,
            generation: handle.generation,
            frontend_pid: Some(handle.frontend_pid),
            backend_pid: Some(handle.backend_pid),
            started_at: Utc::now(),
        };

        {
            // Held while writing so a heal relaunch cannot interleave its
            // own lock update
            let slot = self.inner.frontend.lock().await;
            if slot.generation == session.generation {
                session.frontend_pid = slot.process.as_ref().map(TrackedProcess::pid);
            }
            if let Err(e) =
                write_lock(&self.inner.config.lock_path(), &SessionLock::from(&session)).await
            {
                warn!("Failed to write session lock: {}", e);
            }
            *self.inner.session.write().await = Some(session);
        }

        let urls = self.inner.ports.urls();
        info!(
            "Preview running for {}: frontend {}, backend {}",
            project_id, urls.frontend, urls.backend
        );
        Ok(urls)
    }

    /// Tear down the current preview, including anything left on the fixed
    /// ports. Always succeeds.
    pub async fn stop_current_preview(&self) {
        self.inner.stop_tickets.send_modify(|ticket| *ticket += 1);
        let mut state = self.inner.state.lock().await;
        self.teardown(&mut state).await;
    }

    async fn teardown(&self, state: &mut ControllerState) {
        let mut reaped = 0;
        if let Some(workspace) = state.last_workspace.take() {
            reaped += self.inner.reaper.reap_by_workspace(&workspace).await;
        }
        let ports = self.inner.ports.ports();
        for port in [ports.frontend, ports.backend] {
            reaped += self.inner.reaper.reap_by_port(port).await;
        }

        state.supervisor.stop().await;

        if let Some(session) = self.inner.session.write().await.take() {
            info!("Preview stopped for project {}", session.project_id);
            self.inner
                .logs
                .system(format!("Preview stopped for project {}", session.project_id))
                .await;
        }
        if reaped > 0 {
            info!("Reaped {} orphaned preview processes", reaped);
        }

        if let Err(e) = remove_lock(&self.inner.config.lock_path()).await {
            warn!("Failed to remove session lock: {}", e);
        }
    }

    /// Snapshot of the current session; never waits on a start in progress
    pub async fn status(&self) -> PreviewStatus {
        match self.inner.session.read().await.as_ref() {
            Some(session) => PreviewStatus::Running {
                project_id: session.project_id.clone(),
                frontend_port: session.ports.frontend,
                backend_port: session.ports.backend,
            },
            None => PreviewStatus::Idle,
        }
    }

    /// The running session, with the frontend pid as of now; a dependency
    /// heal replaces the frontend process.
    pub async fn current_session(&self) -> Option<PreviewSession> {
        let mut session = self.inner.session.read().await.clone()?;
        let slot = self.inner.frontend.lock().await;
        if slot.generation == session.generation {
            session.frontend_pid = slot.process.as_ref().map(TrackedProcess::pid);
        }
        Some(session)
    }

    pub async fn logs(&self, since: Option<DateTime<Utc>>, limit: Option<usize>) -> Vec<PreviewLog> {
        self.inner.logs.get(since, limit).await
    }

    pub async fn clear_logs(&self) {
        self.inner.logs.clear().await;
    }

    /// Take the dependency healer armed by the last start. Awaiting it reports
    /// how the observation window ended.
    pub async fn take_heal_watcher(&self) -> Option<JoinHandle<HealOutcome>> {
        self.inner.state.lock().await.supervisor.take_heal_watcher()
    }
}
