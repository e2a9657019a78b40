//! mt-server: Tunnel server
//!
//! The server accepts control sessions from tunnel clients. Every stream a
//! client opens names a target `host:port` in its metadata; the server
//! dials that target and relays bytes until either side is done.

pub mod server;

pub use server::{handle_stream, TunnelError, TunnelServer};
