//! Control session ownership and redialing

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;

use mt_core::config::{BackoffConfig, ClientConfig};
use mt_core::error::SessionError;
use mt_core::session::{ControlSession, TunnelStream};
use mt_protocol::Metadata;

use super::reconnect::ExponentialBackoff;

/// Owns the control session to the tunnel server
///
/// Streams are opened on the current session after a brief read lock.
/// Only a redial after the session closed takes the async `redial` lock,
/// so concurrent callers share one new session.
pub struct SessionDialer {
    address: String,
    timeout: Duration,
    attempts: u32,
    backoff: BackoffConfig,
    current: RwLock<ControlSession>,
    redial: Mutex<()>,
}

impl SessionDialer {
    /// Dial the server named in `config`, retrying with backoff
    pub async fn connect(config: &ClientConfig) -> Result<Self, SessionError> {
        let session = dial_with_retry(
            &config.server_address,
            config.connect_timeout,
            config.connect_attempts,
            &config.backoff,
        )
        .await?;

        Ok(Self {
            address: config.server_address.clone(),
            timeout: config.connect_timeout,
            attempts: config.connect_attempts,
            backoff: config.backoff.clone(),
            current: RwLock::new(session),
            redial: Mutex::new(()),
        })
    }

    /// Tunnel server address
    pub fn address(&self) -> &str {
        &self.address
    }

    fn current(&self) -> ControlSession {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A live session, redialing if the current one has closed
    pub async fn session(&self) -> Result<ControlSession, SessionError> {
        let session = self.current();
        if !session.is_closed() {
            return Ok(session);
        }

        let _redial = self.redial.lock().await;
        // Another caller may have redialed while we waited
        let session = self.current();
        if !session.is_closed() {
            return Ok(session);
        }

        tracing::info!(address = %self.address, "control session closed, reconnecting");
        let fresh = dial_with_retry(&self.address, self.timeout, self.attempts, &self.backoff).await?;
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        Ok(fresh)
    }

    /// Open a stream with `metadata` on a live session
    pub async fn open_stream(&self, metadata: Metadata) -> Result<TunnelStream, SessionError> {
        let session = self.session().await?;
        match session.open_stream(metadata.clone()).await {
            Err(SessionError::Closed) => self.session().await?.open_stream(metadata).await,
            result => result,
        }
    }

    /// End the current session
    pub fn shutdown(&self) {
        self.current().shutdown();
    }
}

/// Dial until a session is up or `attempts` dials failed
///
/// A server that rejects the handshake is not retried.
async fn dial_with_retry(
    address: &str,
    timeout: Duration,
    attempts: u32,
    backoff: &BackoffConfig,
) -> Result<ControlSession, SessionError> {
    let mut backoff = ExponentialBackoff::from_config(backoff);
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match ControlSession::connect(address, timeout).await {
            Ok(session) => {
                tracing::info!("Connected to tunnel server at {}", address);
                return Ok(session);
            }
            Err(e @ SessionError::Rejected(_)) => {
                tracing::error!("Tunnel server rejected the session: {}", e);
                return Err(e);
            }
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    attempt,
                    "Connection failed: {}. Retrying in {:?}",
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
