//! Local listeners forwarded through the tunnel server

mod client;
mod dialer;
mod listener;
mod reconnect;

pub use client::{ClientError, TunnelClient};
pub use dialer::SessionDialer;
pub use listener::ACCEPT_RETRY_DELAY;
pub use reconnect::ExponentialBackoff;
