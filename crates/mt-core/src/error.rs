//! Core error types for the tunnel

use mt_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors establishing or running a control session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Could not reach the tunnel server
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Connecting or the handshake took too long
    #[error("Timed out talking to {0}")]
    Timeout(String),

    /// Server refused the handshake
    #[error("Session rejected by server: {0}")]
    Rejected(String),

    /// Peer sent something other than the expected handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Control connection is gone
    #[error("Control session closed")]
    Closed,
}

/// Errors on a single stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The server ended the stream with an error status
    #[error("{0}")]
    Remote(String),

    /// The stream was cancelled by the peer or by shutdown
    #[error("Stream cancelled")]
    Cancelled,

    /// The control session carrying the stream is gone
    #[error("Control session closed")]
    SessionClosed,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Service name not in the registry
    #[error("Unknown service `{name}`. Valid services: {}", .valid.join(", "))]
    UnknownService { name: String, valid: Vec<String> },

    /// Malformed `[bind:]port:host:hostport` argument
    #[error("Invalid address `{arg}`: {reason}")]
    InvalidAddress { arg: String, reason: String },

    /// Two different tunnels want the same local address
    #[error("Local address {bind} is used by both `{first}` and `{second}`")]
    DuplicateBind {
        bind: String,
        first: String,
        second: String,
    },
}
