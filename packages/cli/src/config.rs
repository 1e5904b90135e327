use codexa_config::constants::{CODEXA_API_PORT, CODEXA_CORS_ORIGIN, CODEXA_DATABASE_PATH, PORT};
use codexa_config::{default_database_path, DEFAULT_API_PORT};
use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
}

/// Settings for the HTTP control surface
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    pub database_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // CODEXA_API_PORT wins; plain PORT is still honoured for older setups
        let port_str = env::var(CODEXA_API_PORT)
            .or_else(|_| env::var(PORT))
            .unwrap_or_else(|_| DEFAULT_API_PORT.to_string());

        let port = port_str.trim().parse::<u16>()?;
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let cors_origin =
            env::var(CODEXA_CORS_ORIGIN).unwrap_or_else(|_| "http://localhost:5173".to_string());

        let database_path = env::var(CODEXA_DATABASE_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        Ok(Config {
            port,
            cors_origin,
            database_path,
        })
    }
}
