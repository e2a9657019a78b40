//! Tunnel client configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the tunnel client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Tunnel server to connect to (`host:port`)
    pub server_address: String,

    /// Timeout for connecting to the server, including the handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How many times a lost control session is redialed before giving up
    pub connect_attempts: u32,

    /// Backoff between redial attempts
    pub backoff: BackoffConfig,

    /// Replacement service table (`name = "[bind:]port:host:hostport"`).
    /// Empty means the built-in table.
    pub services: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "localhost:9008".to_string(),
            connect_timeout: Duration::from_secs(5),
            connect_attempts: 5,
            backoff: BackoffConfig::default(),
            services: BTreeMap::new(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
