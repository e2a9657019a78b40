//! Tunnel server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::option_duration_secs;

/// Configuration for the tunnel server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control listener binds to
    pub bind_address: String,

    /// Upper bound for dialing a tunnel target. `None` waits until the
    /// stream is cancelled.
    #[serde(with = "option_duration_secs", skip_serializing_if = "Option::is_none")]
    pub dial_timeout: Option<Duration>,

    /// Time a new control connection gets to complete the handshake
    #[serde(with = "super::serde_utils::duration_secs")]
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9008".to_string(),
            dial_timeout: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}
