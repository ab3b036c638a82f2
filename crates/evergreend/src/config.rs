//! Daemon configuration.
//!
//! Loaded from a TOML file; every field is optional and falls back to
//! the built-in defaults. Keys match the camelCase names used in the
//! session wire format:
//!
//! ```toml
//! baseUrl = "https://api.pennyworth.app"
//! statePath = "/var/lib/evergreen/session.json"
//! requestTimeoutSeconds = 15
//!
//! [policy]
//! refreshLeadMs = 300000
//! maxRetries = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use evergreen_core::RefreshPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config at {path}: {message}")]
    Read { path: String, message: String },

    /// The file is not valid TOML or has ill-typed fields.
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },
}

/// Daemon configuration, merged from file and command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    /// API origin the renewal and sign-out endpoints live on. Required
    /// for the daemon to start; there is no sensible default origin.
    pub base_url: Option<String>,
    /// Session slot path. Defaults to the platform state directory.
    pub state_path: Option<PathBuf>,
    /// Per-request timeout for transport calls, in seconds.
    pub request_timeout_seconds: u64,
    /// Renewal scheduling knobs.
    pub policy: RefreshPolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            state_path: None,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            policy: RefreshPolicy::default(),
        }
    }
}

impl DaemonConfig {
    /// Default config location: `{config_dir}/evergreen/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("evergreen")
            .join("config.toml")
    }

    /// Loads the config from the given file. A missing file is an
    /// error here; use [`DaemonConfig::load_or_default`] when absence
    /// should fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Loads the config if the file exists, otherwise returns the
    /// defaults. A file that exists but does not parse is still an
    /// error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
