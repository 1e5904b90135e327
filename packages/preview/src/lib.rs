//! Codexa Preview - single-session live preview supervisor
//!
//! Materializes a generated project's stored files into a scratch workspace,
//! runs its frontend and backend on fixed ports, sweeps processes left over
//! from earlier sessions, and repairs missing frontend dependencies once per
//! launch.
//!
//! [`PreviewController`] is the entry point; everything else is exposed for
//! embedding and tests.

pub mod config;
pub mod controller;
pub mod env;
pub mod healer;
pub mod lock;
pub mod logs;
pub mod materializer;
pub mod ports;
pub mod process;
pub mod reaper;
pub mod supervisor;
pub mod types;

pub use config::{CommandSpec, PreviewConfig};
pub use controller::PreviewController;
pub use healer::{is_missing_dependency, DependencyHealer, HealOutcome};
pub use lock::SessionLock;
pub use logs::SessionLogs;
pub use materializer::{validate_project_id, FileMaterializer};
pub use ports::PortRegistry;
pub use reaper::{OrphanReaper, ProcessEntry, ProcessTable, SocketEntry, SystemProcessTable};
pub use supervisor::{ProcessSupervisor, SessionHandle, StopSignal};
pub use types::{
    HealError, LogSource, LogType, PreviewError, PreviewLog, PreviewPorts, PreviewResult,
    PreviewSession, PreviewStatus, PreviewUrls, ProjectWorkspace, ReapError, Role,
    SupervisorState,
};

/// Crate version, reported by the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a controller from the environment backed by the real process table,
/// adopting any session a previous run left behind.
///
/// # Examples
///
/// ```no_run
/// use codexa_preview::init;
/// use codexa_storage::InMemoryFileStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let controller = init(Arc::new(InMemoryFileStore::new())).await;
///     controller.stop_current_preview().await;
/// }
/// ```
pub async fn init(store: std::sync::Arc<dyn codexa_storage::FileStore>) -> PreviewController {
    PreviewController::new_with_recovery(
        PreviewConfig::from_env(),
        store,
        std::sync::Arc::new(SystemProcessTable::new()),
    )
    .await
}
