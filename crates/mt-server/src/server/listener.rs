//! Control connection listener
//!
//! Accepts tunnel clients and runs one session task per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mt_core::config::ServerConfig;

use super::handler::serve_session;

/// Pause after a failed accept before trying again
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Server accepting control sessions from tunnel clients
pub struct TunnelServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl TunnelServer {
    /// Bind the control listener to `config.bind_address`
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept sessions until `cancel` fires, then end every session
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("Tunnel server listening on {}", self.local_addr()?);

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Tunnel server shutting down");
                    break;
                }

                result = self.listener.accept() => match result {
                    Ok((socket, peer_addr)) => {
                        tracing::debug!(%peer_addr, "new control connection");
                        let _ = socket.set_nodelay(true);
                        sessions.spawn(serve_session(
                            socket,
                            peer_addr,
                            Arc::clone(&self.config),
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                        back_off(&cancel).await;
                    }
                },

                Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = result {
                        tracing::warn!("Session task failed: {}", e);
                    }
                }
            }
        }

        while sessions.join_next().await.is_some() {}
        Ok(())
    }
}

/// Wait out [`ACCEPT_RETRY_DELAY`], returning early on `cancel`
async fn back_off(cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
        _ = cancel.cancelled() => {}
    }
}
