//! Tunnel client: one listener per planned tunnel

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mt_core::address::AddressSpec;

use super::dialer::SessionDialer;
use super::listener::serve_listener;

/// Errors that stop the whole client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing to tunnel
    #[error("No tunnels planned")]
    EmptyPlan,

    /// Every listener failed to bind
    #[error("No tunnel could be started: {0}")]
    NoTunnels(String),
}

/// Runs the local listeners of a tunnel plan over one dialer
pub struct TunnelClient {
    dialer: Arc<SessionDialer>,
    plan: Vec<AddressSpec>,
}

impl TunnelClient {
    /// Create a client for `plan`
    pub fn new(dialer: Arc<SessionDialer>, plan: Vec<AddressSpec>) -> Self {
        Self { dialer, plan }
    }

    /// Bind every tunnel and serve until `cancel` fires
    ///
    /// A tunnel whose address cannot be bound is logged and skipped; the
    /// others keep running. Fails only when no tunnel could be bound.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        if self.plan.is_empty() {
            return Err(ClientError::EmptyPlan);
        }

        let mut listeners = JoinSet::new();
        let mut failures = Vec::new();
        for spec in &self.plan {
            let local = spec.bind_address();
            match TcpListener::bind(&local).await {
                Ok(listener) => {
                    listeners.spawn(serve_listener(
                        listener,
                        spec.clone(),
                        Arc::clone(&self.dialer),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    tracing::error!(%local, remote = %spec.remote_address(), "start listening: {}", e);
                    failures.push(format!("{}: {}", local, e));
                }
            }
        }

        if listeners.is_empty() {
            return Err(ClientError::NoTunnels(failures.join("; ")));
        }

        while let Some(result) = listeners.join_next().await {
            if let Err(e) = result {
                tracing::warn!("listener task failed: {}", e);
            }
        }
        Ok(())
    }
}
