//! Configuration management
//!
//! One TOML file holds a section per component. Every section falls back
//! to its defaults, so an empty or missing file is valid.

mod client;
mod datastore;
mod server;
pub mod serde_utils;

pub use client::{BackoffConfig, ClientConfig};
pub use datastore::{ComposeConfig, DatastoreConfig};
pub use server::ServerConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config and data directories
pub const APP_NAME: &str = "manage";

/// Contents of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Tunnel client settings
    pub client: ClientConfig,
    /// Tunnel server settings
    pub server: ServerConfig,
    /// Datastore endpoints
    pub datastore: DatastoreConfig,
    /// docker-compose wrapper settings
    pub compose: ComposeConfig,
}

impl ConfigFile {
    /// Load from `path`, or from the default path when `None`.
    ///
    /// A missing file at the default path yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => load_config(path),
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    load_config(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
