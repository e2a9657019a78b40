//! mt-core: Core tunneling machinery
//!
//! This crate provides the pieces shared by the tunnel client, the tunnel
//! server and the CLI: address plans, control sessions carrying tunneled
//! streams, the byte relay between a stream and a socket, configuration,
//! and the datastore HTTP client.

pub mod address;
pub mod bridge;
pub mod config;
pub mod datastore;
pub mod error;
pub mod services;
pub mod session;
pub mod traits;

pub use address::AddressSpec;
pub use bridge::{bridge, Direction, BRIDGE_BUFFER_SIZE};
pub use error::{ConfigError, SessionError, StreamError};
pub use services::ServiceRegistry;
pub use session::{ControlSession, IncomingStreams, TunnelStream};
