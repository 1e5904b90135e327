// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Codexa

// API Server Configuration
pub const CODEXA_API_PORT: &str = "CODEXA_API_PORT";
pub const PORT: &str = "PORT"; // Legacy
pub const CODEXA_CORS_ORIGIN: &str = "CODEXA_CORS_ORIGIN";

// Storage Configuration
pub const CODEXA_DATABASE_PATH: &str = "CODEXA_DATABASE_PATH";

// Preview Workspace Configuration
pub const CODEXA_PREVIEW_DIR: &str = "CODEXA_PREVIEW_DIR";
pub const CODEXA_PREVIEW_HOST: &str = "CODEXA_PREVIEW_HOST";
pub const CODEXA_FRONTEND_PORT: &str = "CODEXA_FRONTEND_PORT";
pub const CODEXA_BACKEND_PORT: &str = "CODEXA_BACKEND_PORT";

// Preview Process Commands
pub const CODEXA_FRONTEND_COMMAND: &str = "CODEXA_FRONTEND_COMMAND";
pub const CODEXA_BACKEND_COMMAND: &str = "CODEXA_BACKEND_COMMAND";
pub const CODEXA_INSTALL_COMMAND: &str = "CODEXA_INSTALL_COMMAND";
pub const CODEXA_INSTALL_ON_START: &str = "CODEXA_INSTALL_ON_START";

// Dependency Healing
pub const CODEXA_HEAL_WINDOW_SECS: &str = "CODEXA_HEAL_WINDOW_SECS";
pub const CODEXA_INSTALL_TIMEOUT_SECS: &str = "CODEXA_INSTALL_TIMEOUT_SECS";

// System Environment Variables
pub const HOME: &str = "HOME";
pub const USERPROFILE: &str = "USERPROFILE"; // Windows
