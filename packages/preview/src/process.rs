// ABOUTME: Spawning and terminating preview child processes
// ABOUTME: Output pumps feed the session log and an optional line tap for the healer

use codexa_config::constants::PORT;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::logs::SessionLogs;
use crate::types::{LogSource, LogType, PreviewError, PreviewResult, Role};

/// Capacity of the channel that mirrors frontend output to the healer
pub const OUTPUT_TAP_CAPACITY: usize = 256;

/// Receiving half of an output tap
pub type OutputTap = mpsc::Receiver<String>;

/// A launched role process. Dropping it does not kill the child; call
/// [`TrackedProcess::terminate`].
#[derive(Debug)]
pub struct TrackedProcess {
    role: Role,
    pid: u32,
    command: String,
    child: Child,
}

impl TrackedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Send SIGTERM to the child's process group and reap it in the
    /// background. Does not wait for the exit.
    pub fn terminate(mut self) {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) => info!(
                    "Sent SIGTERM to {} process group {}",
                    self.role, self.pid
                ),
                Err(Errno::ESRCH) => {
                    debug!("{} process group {} already gone", self.role, self.pid)
                }
                Err(e) => warn!(
                    "Failed to signal {} process group {}: {}",
                    self.role, self.pid, e
                ),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                warn!("Failed to kill {} process {}: {}", self.role, self.pid, e);
            }
        }

        let role = self.role;
        let pid = self.pid;
        tokio::spawn(async move {
            match self.child.wait().await {
                Ok(status) => debug!("{} process {} exited with {}", role, pid, status),
                Err(e) => debug!("Failed to reap {} process {}: {}", role, pid, e),
            }
        });
    }
}

/// Forward every line of `stream` into the session log, mirroring it to `tap`
/// when one is attached. A full or closed tap drops lines silently.
fn pump_output<R>(
    stream: R,
    source: LogSource,
    log_type: LogType,
    logs: SessionLogs,
    tap: Option<mpsc::Sender<String>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(tap) = &tap {
                let _ = tap.try_send(line.clone());
            }
            logs.push(source, log_type, line).await;
        }
    });
}

fn capture_output(
    child: &mut Child,
    source: LogSource,
    logs: &SessionLogs,
    tap: Option<mpsc::Sender<String>>,
) {
    if let Some(stdout) = child.stdout.take() {
        pump_output(stdout, source, LogType::Stdout, logs.clone(), tap.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        pump_output(stderr, source, LogType::Stderr, logs.clone(), tap);
    }
}

/// Launch `spec` for `role` in `cwd` with `PORT` set. The child gets its own
/// process group so a single signal reaches everything it spawns.
///
/// When `with_tap` is set the returned receiver sees every output line.
pub fn spawn_role(
    role: Role,
    spec: &CommandSpec,
    cwd: &Path,
    port: u16,
    logs: &SessionLogs,
    with_tap: bool,
) -> PreviewResult<(TrackedProcess, Option<OutputTap>)> {
    let command_line = spec.display_for_port(port);

    let mut command = Command::new(&spec.program);
    command
        .args(spec.args_for_port(port))
        .current_dir(cwd)
        .env(PORT, port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| PreviewError::Launch {
        role,
        command: command_line.clone(),
        reason: e.to_string(),
    })?;

    let pid = child.id().ok_or_else(|| PreviewError::Launch {
        role,
        command: command_line.clone(),
        reason: "process exited before its pid could be read".to_string(),
    })?;

    let (tap_tx, tap_rx) = if with_tap {
        let (tx, rx) = mpsc::channel(OUTPUT_TAP_CAPACITY);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    capture_output(&mut child, role.into(), logs, tap_tx);

    info!(
        "Launched {} '{}' in {} (pid {}, port {})",
        role,
        command_line,
        cwd.display(),
        pid,
        port
    );

    Ok((
        TrackedProcess {
            role,
            pid,
            command: command_line,
            child,
        },
        tap_rx,
    ))
}

/// Failure of a one-shot command such as a dependency install
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: ExitStatus },

    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("failed waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run the dependency install command in `cwd` and wait for it, bounded by
/// `timeout`. Output goes to the frontend log. The child is killed if the
/// timeout fires.
pub async fn run_install(
    spec: &CommandSpec,
    cwd: &Path,
    timeout: Duration,
    logs: &SessionLogs,
) -> Result<(), InstallError> {
    let command_line = spec.to_string();
    logs.system(format!("Running '{}' in {}", command_line, cwd.display()))
        .await;

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InstallError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    capture_output(&mut child, LogSource::Frontend, logs, None);

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(InstallError::Wait {
                command: command_line,
                source,
            })
        }
        Err(_) => {
            return Err(InstallError::Timeout {
                command: command_line,
                secs: timeout.as_secs(),
            })
        }
    };

    if status.success() {
        info!("'{}' finished in {}", command_line, cwd.display());
        Ok(())
    } else {
        Err(InstallError::Failed {
            command: command_line,
            status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    async fn wait_for_log(logs: &SessionLogs, needle: &str) -> bool {
        for _ in 0..100 {
            if logs.get(None, None).await.iter().any(|l| l.message == needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_spawn_sets_port_and_captures_output() {
        let temp = TempDir::new().unwrap();
        let logs = SessionLogs::new();

        let (process, tap) = spawn_role(
            Role::Backend,
            &sh("echo port=$PORT; echo arg={port} >&2"),
            temp.path(),
            7979,
            &logs,
            false,
        )
        .unwrap();
        assert!(tap.is_none());
        assert!(process.pid() > 0);

        assert!(wait_for_log(&logs, "port=7979").await);
        assert!(wait_for_log(&logs, "arg=7979").await);

        let entries = logs.get(None, None).await;
        let stderr = entries.iter().find(|l| l.message == "arg=7979").unwrap();
        assert_eq!(stderr.source, LogSource::Backend);
        assert_eq!(stderr.log_type, LogType::Stderr);
    }

    #[tokio::test]
    async fn test_tap_mirrors_output() {
        let temp = TempDir::new().unwrap();
        let logs = SessionLogs::new();

        let (process, tap) = spawn_role(
            Role::Frontend,
            &sh("echo hello; sleep 5"),
            temp.path(),
            5959,
            &logs,
            true,
        )
        .unwrap();
        let mut tap = tap.unwrap();

        let line = tokio::time::timeout(Duration::from_secs(5), tap.recv())
            .await
            .unwrap();
        assert_eq!(line.as_deref(), Some("hello"));
        process.terminate();
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let logs = SessionLogs::new();
        let spec = CommandSpec::new("codexa-definitely-not-installed", Vec::<String>::new());

        let err = spawn_role(Role::Backend, &spec, temp.path(), 7979, &logs, false).unwrap_err();
        assert!(matches!(
            err,
            PreviewError::Launch {
                role: Role::Backend,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_install_outcomes() {
        let temp = TempDir::new().unwrap();
        let logs = SessionLogs::new();
        let timeout = Duration::from_secs(5);

        assert!(run_install(&sh("exit 0"), temp.path(), timeout, &logs).await.is_ok());
        assert!(matches!(
            run_install(&sh("exit 3"), temp.path(), timeout, &logs).await,
            Err(InstallError::Failed { .. })
        ));
        assert!(matches!(
            run_install(&sh("sleep 5"), temp.path(), Duration::from_millis(200), &logs).await,
            Err(InstallError::Timeout { .. })
        ));
    }
}
