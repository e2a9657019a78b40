//! manage: development helper for the service stack
//!
//! Tunnels local ports to services behind a tunnel server, talks to the
//! datastore and wraps docker-compose.

pub mod commands;
pub mod output;
