//! `cs` configuration, read from a TOML file

mod api;
pub mod serde_utils;
mod session;

pub use api::{ApiConfig, BackoffConfig, RetryPolicy};
pub use session::SessionConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsConfig {
    /// Workspace API client settings
    pub api: ApiConfig,
    /// Session transport settings
    pub session: SessionConfig,
}

/// `<config dir>/codespace-tunnel`, or `./codespace-tunnel` without a home
pub fn default_config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("codespace-tunnel")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Parse a TOML file into `T`
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "reading {}: {}",
                path.display(),
                e
            )))
        }
    };
    Ok(toml::from_str(&text)?)
}

/// Load the configuration at `path`, falling back to defaults when absent
pub fn load_or_default(path: &Path) -> Result<CsConfig, ConfigError> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(CsConfig::default())
        }
        Err(e) => Err(e),
    }
}
