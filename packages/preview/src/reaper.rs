// ABOUTME: Best-effort sweeper for preview processes the supervisor lost track of
// ABOUTME: Matches by working directory or listening port and SIGKILLs what it finds

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::{ProjectWorkspace, ReapError};

/// A process as seen in the OS process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub cwd: Option<PathBuf>,
    pub cmdline: Vec<String>,
}

/// A listening TCP socket and the process that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEntry {
    pub port: u16,
    pub pid: u32,
}

/// Read and act on the OS process table. Calls block.
pub trait ProcessTable: Send + Sync {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, ReapError>;
    fn list_listening_sockets(&self) -> Result<Vec<SocketEntry>, ReapError>;
    fn kill(&self, pid: u32) -> Result<(), ReapError>;
}

/// [`ProcessTable`] backed by the running system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcessTable {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, ReapError> {
        use sysinfo::{ProcessRefreshKind, System};

        let mut system = System::new();
        system.refresh_processes_specifics(ProcessRefreshKind::everything());

        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                cwd: process.cwd().map(Path::to_path_buf),
                cmdline: process.cmd().to_vec(),
            })
            .collect())
    }

    fn list_listening_sockets(&self) -> Result<Vec<SocketEntry>, ReapError> {
        platform::listening_sockets()
    }

    #[cfg(unix)]
    fn kill(&self, pid: u32) -> Result<(), ReapError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ReapError::Vanished { pid }),
            Err(e) => Err(ReapError::AccessDenied {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self, pid: u32) -> Result<(), ReapError> {
        use sysinfo::{Pid, System};

        let mut system = System::new();
        system.refresh_processes();
        match system.process(Pid::from_u32(pid)) {
            Some(process) if process.kill() => Ok(()),
            Some(_) => Err(ReapError::AccessDenied {
                pid,
                reason: "kill request was refused".to_string(),
            }),
            None => Err(ReapError::Vanished { pid }),
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::{ReapError, SocketEntry};
    use std::collections::HashMap;
    use std::fs;

    /// TCP state code for LISTEN in /proc/net/tcp
    const TCP_LISTEN: &str = "0A";

    /// Parse `/proc/net/tcp`-format content into (port, inode) pairs for
    /// listening sockets.
    pub(super) fn parse_proc_net_tcp(content: &str) -> Vec<(u16, u64)> {
        content
            .lines()
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 10 || parts[3] != TCP_LISTEN {
                    return None;
                }
                let (_ip, port_hex) = parts[1].rsplit_once(':')?;
                let port = u16::from_str_radix(port_hex, 16).ok()?;
                let inode = parts[9].parse::<u64>().ok()?;
                (inode != 0).then_some((port, inode))
            })
            .collect()
    }

    /// Map socket inodes to the pids holding them
    fn socket_owners() -> HashMap<u64, u32> {
        let mut owners = HashMap::new();
        let Ok(proc_dir) = fs::read_dir("/proc") else {
            return owners;
        };

        for entry in proc_dir.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            let Ok(fds) = fs::read_dir(format!("/proc/{}/fd", pid)) else {
                continue;
            };
            for fd in fds.flatten() {
                if let Ok(link) = fs::read_link(fd.path()) {
                    if let Some(inode) = link
                        .to_str()
                        .and_then(|l| l.strip_prefix("socket:["))
                        .and_then(|l| l.strip_suffix(']'))
                        .and_then(|l| l.parse::<u64>().ok())
                    {
                        owners.entry(inode).or_insert(pid);
                    }
                }
            }
        }
        owners
    }

    pub(super) fn listening_sockets() -> Result<Vec<SocketEntry>, ReapError> {
        let mut listening = Vec::new();
        let mut read_any = false;
        for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
            if let Ok(content) = fs::read_to_string(table) {
                read_any = true;
                listening.extend(parse_proc_net_tcp(&content));
            }
        }
        if !read_any {
            return Err(ReapError::Enumeration {
                what: "listening sockets",
                reason: "/proc/net/tcp is not readable".to_string(),
            });
        }
        if listening.is_empty() {
            return Ok(Vec::new());
        }

        let owners = socket_owners();
        Ok(listening
            .into_iter()
            .filter_map(|(port, inode)| owners.get(&inode).map(|&pid| SocketEntry { port, pid }))
            .collect())
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{ReapError, SocketEntry};
    use std::process::{Command, Stdio};

    /// Parse `lsof -nP -iTCP -sTCP:LISTEN -Fpn` output
    pub(super) fn parse_lsof(output: &str) -> Vec<SocketEntry> {
        let mut sockets = Vec::new();
        let mut current_pid = None;
        for line in output.lines() {
            if let Some(pid) = line.strip_prefix('p') {
                current_pid = pid.parse::<u32>().ok();
            } else if let Some(name) = line.strip_prefix('n') {
                let port = name
                    .rsplit_once(':')
                    .and_then(|(_, port)| port.parse::<u16>().ok());
                if let (Some(pid), Some(port)) = (current_pid, port) {
                    sockets.push(SocketEntry { port, pid });
                }
            }
        }
        sockets
    }

    pub(super) fn listening_sockets() -> Result<Vec<SocketEntry>, ReapError> {
        let output = Command::new("lsof")
            .args(["-nP", "-iTCP", "-sTCP:LISTEN", "-Fpn"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ReapError::Enumeration {
                what: "listening sockets",
                reason: e.to_string(),
            })?;

        // lsof exits 1 when nothing matches
        Ok(parse_lsof(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod platform {
    use super::{ReapError, SocketEntry};

    pub(super) fn listening_sockets() -> Result<Vec<SocketEntry>, ReapError> {
        Ok(Vec::new())
    }
}

/// Kills processes left behind by earlier preview sessions.
///
/// Everything here is best-effort: failures are logged, never returned.
#[derive(Clone)]
pub struct OrphanReaper {
    table: Arc<dyn ProcessTable>,
    own_pid: u32,
}

impl OrphanReaper {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            own_pid: std::process::id(),
        }
    }

    /// Kill every process whose working directory is the workspace root or
    /// lies inside it. Returns how many were killed.
    pub async fn reap_by_workspace(&self, workspace: &ProjectWorkspace) -> usize {
        let table = Arc::clone(&self.table);
        let own_pid = self.own_pid;
        let workspace = workspace.clone();

        let result = tokio::task::spawn_blocking(move || {
            let processes = match table.list_processes() {
                Ok(processes) => processes,
                Err(e) => {
                    warn!("Reaper could not list processes: {}", e);
                    return 0;
                }
            };

            let targets = processes.into_iter().filter_map(|p| {
                p.cwd
                    .as_deref()
                    .filter(|cwd| workspace.contains(cwd))
                    .map(|_| p.pid)
            });
            kill_all(
                table.as_ref(),
                own_pid,
                targets,
                &workspace.root_dir.display().to_string(),
            )
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!("Reaper task failed: {}", e);
            0
        })
    }

    /// Kill every process holding a listening socket on `port`. Returns how
    /// many were killed.
    pub async fn reap_by_port(&self, port: u16) -> usize {
        let table = Arc::clone(&self.table);
        let own_pid = self.own_pid;

        let result = tokio::task::spawn_blocking(move || {
            let sockets = match table.list_listening_sockets() {
                Ok(sockets) => sockets,
                Err(e) => {
                    warn!("Reaper could not list sockets: {}", e);
                    return 0;
                }
            };

            let targets = sockets
                .into_iter()
                .filter(|s| s.port == port)
                .map(|s| s.pid);
            kill_all(table.as_ref(), own_pid, targets, &format!("port {}", port))
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!("Reaper task failed: {}", e);
            0
        })
    }
}

fn kill_all(
    table: &dyn ProcessTable,
    own_pid: u32,
    pids: impl Iterator<Item = u32>,
    target: &str,
) -> usize {
    let mut seen = HashSet::new();
    let mut killed = 0;

    for pid in pids {
        if pid == own_pid || !seen.insert(pid) {
            continue;
        }
        match table.kill(pid) {
            Ok(()) => {
                killed += 1;
                info!("Reaped orphan process {} ({})", pid, target);
            }
            Err(ReapError::Vanished { pid }) => debug!("Process {} already exited", pid),
            Err(e) => warn!("Failed to reap process {}: {}", pid, e),
        }
    }

    killed
}
