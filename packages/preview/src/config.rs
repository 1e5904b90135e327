use codexa_config::constants::*;
use codexa_config::{default_preview_dir, DEFAULT_BACKEND_PORT, DEFAULT_FRONTEND_PORT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::env::{parse_bool_or_default, parse_command, parse_env_or_default_with_validation};
use crate::types::PreviewPorts;

const PORT_PLACEHOLDER: &str = "{port}";

#[cfg(windows)]
const NPM: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM: &str = "npm";

/// A program plus arguments. `{port}` in any argument is replaced by the
/// port of the role the command is launched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a split command line; `None` for an empty one
    pub fn from_parts(mut parts: Vec<String>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        let program = parts.remove(0);
        Some(Self {
            program,
            args: parts,
        })
    }

    /// Arguments with the port placeholder substituted
    pub fn args_for_port(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }

    /// Human readable command line for logs and errors
    pub fn display_for_port(&self, port: u16) -> String {
        let mut line = self.program.clone();
        for arg in self.args_for_port(port) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Everything the preview supervisor needs to know about its environment.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Root scratch directory; each project gets `<root>/<project_id>`
    pub scratch_root: PathBuf,
    /// Host used when building preview URLs
    pub host: String,
    pub ports: PreviewPorts,
    pub frontend_command: CommandSpec,
    pub backend_command: CommandSpec,
    pub install_command: CommandSpec,
    /// Run the install command before the first frontend launch when
    /// `node_modules` is missing
    pub install_on_start: bool,
    /// How long the healer watches frontend output after launch
    pub heal_window: Duration,
    /// Upper bound on a single dependency install
    pub install_timeout: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scratch_root: default_preview_dir(),
            host: "localhost".to_string(),
            ports: PreviewPorts {
                frontend: DEFAULT_FRONTEND_PORT,
                backend: DEFAULT_BACKEND_PORT,
            },
            frontend_command: CommandSpec::new(NPM, ["run", "dev", "--", "--port", PORT_PLACEHOLDER]),
            backend_command: CommandSpec::new(
                "uvicorn",
                ["main:app", "--host", "127.0.0.1", "--port", PORT_PLACEHOLDER],
            ),
            install_command: CommandSpec::new(NPM, ["install"]),
            install_on_start: true,
            heal_window: Duration::from_secs(10),
            install_timeout: Duration::from_secs(300),
        }
    }
}

impl PreviewConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scratch_root = std::env::var(CODEXA_PREVIEW_DIR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.scratch_root);

        let host = std::env::var(CODEXA_PREVIEW_HOST)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.host);

        let ports = PreviewPorts {
            frontend: parse_env_or_default_with_validation(
                CODEXA_FRONTEND_PORT,
                defaults.ports.frontend,
                |p: u16| p > 0,
            ),
            backend: parse_env_or_default_with_validation(
                CODEXA_BACKEND_PORT,
                defaults.ports.backend,
                |p: u16| p > 0,
            ),
        };

        let command_or = |var: &str, fallback: CommandSpec| {
            parse_command(var)
                .and_then(CommandSpec::from_parts)
                .unwrap_or(fallback)
        };

        Self {
            scratch_root,
            host,
            ports,
            frontend_command: command_or(CODEXA_FRONTEND_COMMAND, defaults.frontend_command),
            backend_command: command_or(CODEXA_BACKEND_COMMAND, defaults.backend_command),
            install_command: command_or(CODEXA_INSTALL_COMMAND, defaults.install_command),
            install_on_start: parse_bool_or_default(
                CODEXA_INSTALL_ON_START,
                defaults.install_on_start,
            ),
            heal_window: Duration::from_secs(parse_env_or_default_with_validation(
                CODEXA_HEAL_WINDOW_SECS,
                defaults.heal_window.as_secs(),
                |v: u64| (1..=300).contains(&v),
            )),
            install_timeout: Duration::from_secs(parse_env_or_default_with_validation(
                CODEXA_INSTALL_TIMEOUT_SECS,
                defaults.install_timeout.as_secs(),
                |v: u64| (1..=3600).contains(&v),
            )),
        }
    }

    /// Path of the lock file describing the running session
    pub fn lock_path(&self) -> PathBuf {
        self.scratch_root.join("preview-lock.json")
    }
}
