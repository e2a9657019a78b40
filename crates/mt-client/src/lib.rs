//! mt-client: Tunnel client
//!
//! The client listens on one local address per planned tunnel. Every
//! accepted connection becomes a stream on a shared control session to the
//! tunnel server, which dials the remote end.

pub mod tunnel;

pub use tunnel::{ClientError, ExponentialBackoff, SessionDialer, TunnelClient};
