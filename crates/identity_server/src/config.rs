//! Environment-driven server configuration.
//!
//! # Responsibility
//! - Read bind address, database path and logging settings once at startup.
//!
//! # Invariants
//! - Relative paths are resolved against the working directory, so every
//!   path in a built `ServerConfig` is absolute.

use identity_core::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

pub const PORT_ENV: &str = "PORT";
pub const HOST_ENV: &str = "IDENTITY_HTTP_HOST";
pub const DB_PATH_ENV: &str = "SQLITE_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "IDENTITY_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "IDENTITY_LOG_DIR";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_HOST: &str = "0.0.0.0";

/// Startup configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort(String),
    InvalidHost(String),
    WorkingDirectory(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPort(value) => write!(f, "{PORT_ENV} must be a port number, got `{value}`"),
            Self::InvalidHost(value) => {
                write!(f, "{HOST_ENV} must be an IP address, got `{value}`")
            }
            Self::WorkingDirectory(message) => {
                write!(f, "cannot resolve working directory: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

impl ServerConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd =
            std::env::current_dir().map_err(|err| ConfigError::WorkingDirectory(err.to_string()))?;
        Self::from_lookup(&cwd, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup(
        cwd: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match read(PORT_ENV) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value.clone()))?,
            None => DEFAULT_PORT,
        };
        let host_text = read(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host_text
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(host_text.clone()))?;

        let db_path = read(DB_PATH_ENV)
            .map(|value| absolutize(cwd, value))
            .unwrap_or_else(|| cwd.join("data").join("contacts.sqlite"));
        let log_dir = read(LOG_DIR_ENV)
            .map(|value| absolutize(cwd, value))
            .unwrap_or_else(|| cwd.join("logs"));
        let log_level = read(LOG_LEVEL_ENV).unwrap_or_else(|| default_log_level().to_string());

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            db_path,
            log_level,
            log_dir,
        })
    }
}

fn absolutize(cwd: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
