//! Codexa Config - environment variable names, defaults and data directories.

pub mod constants;

use std::env;
use std::path::PathBuf;

/// Port the preview frontend dev server binds. Generated frontend code is
/// written against these values, so they are not allocated at runtime.
pub const DEFAULT_FRONTEND_PORT: u16 = 5959;

/// Port the preview backend server binds.
pub const DEFAULT_BACKEND_PORT: u16 = 7979;

/// Port the Codexa API listens on.
pub const DEFAULT_API_PORT: u16 = 4001;

/// Get the path to the Codexa directory (~/.codexa)
pub fn codexa_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var(constants::HOME) {
        return PathBuf::from(home).join(".codexa");
    }

    match dirs::home_dir() {
        Some(home) => home.join(".codexa"),
        None => {
            tracing::warn!("Could not determine home directory, using current directory");
            PathBuf::from(".codexa")
        }
    }
}

/// Default location of the SQLite file store
pub fn default_database_path() -> PathBuf {
    codexa_dir().join("codexa.db")
}

/// Default scratch root that preview workspaces are materialized under
pub fn default_preview_dir() -> PathBuf {
    env::temp_dir().join("codexa")
}
