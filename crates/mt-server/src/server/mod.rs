//! Tunnel server implementation

mod handler;
mod listener;

pub use handler::{handle_stream, serve_session, target_address, TunnelError};
pub use listener::{TunnelServer, ACCEPT_RETRY_DELAY};
