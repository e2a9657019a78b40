//! Datastore and docker-compose settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Endpoints of the datastore services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Base URL of the datastore reader
    pub reader_url: String,
    /// Base URL of the datastore writer
    pub writer_url: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            reader_url: "http://localhost:9010/internal/datastore/reader".to_string(),
            writer_url: "http://localhost:9011/internal/datastore/writer".to_string(),
        }
    }
}

/// Settings for the `compose` command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Directory holding `docker-compose.yml`; defaults to the data directory
    pub data_dir: Option<PathBuf>,
    /// Program to run instead of `docker-compose`
    pub program: Option<String>,
}

impl ComposeConfig {
    /// Directory the compose file lives in
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(super::default_data_dir)
    }

    /// Program to invoke
    pub fn program(&self) -> &str {
        self.program.as_deref().unwrap_or("docker-compose")
    }
}
