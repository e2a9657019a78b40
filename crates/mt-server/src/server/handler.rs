//! Control session handler
//!
//! Runs one tunnel client's session: every stream it opens gets its own
//! task that dials the requested target and bridges the two.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mt_core::bridge::{bridge, RelayError};
use mt_core::config::ServerConfig;
use mt_core::session::{ControlSession, TunnelStream};
use mt_protocol::{Metadata, ADDR_KEY};

/// Why a tunneled stream ended with an error
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The stream did not name exactly one target
    #[error("expected exactly one `addr` metadata value, got {0}")]
    MissingAddress(usize),

    /// The target could not be reached
    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The target did not answer in time
    #[error("dial {addr}: timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// The client abandoned the stream before it was connected
    #[error("stream cancelled")]
    Cancelled,

    /// Relaying failed after the target was connected
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// The single target address carried by stream metadata
pub fn target_address(metadata: &Metadata) -> Result<String, TunnelError> {
    match metadata.get_all(ADDR_KEY).as_slice() {
        [addr] => Ok(addr.to_string()),
        values => Err(TunnelError::MissingAddress(values.len())),
    }
}

/// Serve one control connection until the client leaves or `cancel` fires
pub async fn serve_session(
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let mut incoming =
        match ControlSession::accept(socket, peer_addr.to_string(), config.handshake_timeout).await
        {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(%peer_addr, "handshake failed: {}", e);
                return;
            }
        };
    tracing::info!(%peer_addr, "tunnel client connected");

    let mut streams = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            stream = incoming.next() => match stream {
                Some(stream) => {
                    streams.spawn(handle_stream(stream, config.dial_timeout));
                }
                None => break,
            },

            Some(_) = streams.join_next(), if !streams.is_empty() => {}
        }
    }

    incoming.shutdown();
    streams.shutdown().await;
    tracing::info!(%peer_addr, "tunnel client disconnected");
}

/// Dial the stream's target, relay until done and report the outcome
///
/// The stream always ends with a status: `None` on success, otherwise the
/// error text.
pub async fn handle_stream(stream: TunnelStream, dial_timeout: Option<Duration>) {
    serve_stream(stream, move |addr| async move { dial(&addr, dial_timeout).await }).await
}

async fn serve_stream<F, Fut>(mut stream: TunnelStream, connect: F)
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<TcpStream, TunnelError>>,
{
    let id = stream.id();
    let result = tunnel(&mut stream, connect).await;

    let status = match result {
        Ok(()) => {
            tracing::debug!(stream = %id, "stream finished");
            None
        }
        Err(e) if stream.cancel_token().is_cancelled() => {
            tracing::debug!(stream = %id, "stream ended by client: {}", e);
            Some(e.to_string())
        }
        Err(e) => {
            tracing::warn!(stream = %id, "tunnel failed: {}", e);
            Some(e.to_string())
        }
    };

    stream.finish(status).await;
}

async fn tunnel<F, Fut>(stream: &mut TunnelStream, connect: F) -> Result<(), TunnelError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<TcpStream, TunnelError>>,
{
    let addr = target_address(stream.metadata())?;
    let cancel = stream.cancel_token().clone();

    let socket = tokio::select! {
        _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
        result = connect(addr.clone()) => result?,
    };
    let _ = socket.set_nodelay(true);
    tracing::debug!(stream = %stream.id(), %addr, "target connected");

    let (reader, writer) = stream.halves();
    bridge(reader, writer, socket).await?;
    Ok(())
}

async fn dial(addr: &str, timeout: Option<Duration>) -> Result<TcpStream, TunnelError> {
    let connect = TcpStream::connect(addr);
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TunnelError::DialTimeout {
                addr: addr.to_string(),
                timeout,
            })?,
        None => connect.await,
    };

    result.map_err(|source| TunnelError::Dial {
        addr: addr.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt_core::session::IncomingStreams;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(5);

    async fn pair() -> (ControlSession, IncomingStreams) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(ControlSession::accept(server_io, "client", WAIT));
        let client = ControlSession::client(client_io, "server").await.unwrap();
        (client, server.await.unwrap().unwrap())
    }

    /// Serve `stream` with a dial that never completes; resolves once the
    /// dial has started
    async fn serve_with_stuck_dial(stream: TunnelStream) -> JoinHandle<()> {
        let (started_tx, started_rx) = oneshot::channel();
        let handler = tokio::spawn(serve_stream(stream, move |_addr| async move {
            let _ = started_tx.send(());
            std::future::pending().await
        }));
        tokio::time::timeout(WAIT, started_rx)
            .await
            .expect("dial never started")
            .unwrap();
        handler
    }

    #[tokio::test]
    async fn test_session_shutdown_aborts_pending_dial() {
        let (client, mut incoming) = pair().await;
        let _local = client
            .open_stream(Metadata::with_addr("target:9"))
            .await
            .unwrap();
        let remote = incoming.next().await.unwrap();

        let handler = serve_with_stuck_dial(remote).await;
        assert!(!handler.is_finished());

        incoming.shutdown();
        tokio::time::timeout(WAIT, handler)
            .await
            .expect("handler did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_cancel_aborts_pending_dial() {
        let (client, mut incoming) = pair().await;
        let local = client
            .open_stream(Metadata::with_addr("target:9"))
            .await
            .unwrap();
        let remote = incoming.next().await.unwrap();

        let handler = serve_with_stuck_dial(remote).await;
        assert!(!handler.is_finished());

        drop(local);
        tokio::time::timeout(WAIT, handler)
            .await
            .expect("handler did not stop after cancel")
            .unwrap();
    }

    #[test]
    fn test_single_address() {
        let md = Metadata::with_addr("auth:9004");
        assert_eq!(target_address(&md).unwrap(), "auth:9004");
    }

    #[test]
    fn test_missing_address() {
        let err = target_address(&Metadata::new()).unwrap_err();
        assert!(matches!(err, TunnelError::MissingAddress(0)));
        assert!(err.to_string().contains("got 0"));
    }

    #[test]
    fn test_duplicate_address() {
        let mut md = Metadata::with_addr("a:1");
        md.append("Addr", "b:2");
        assert!(matches!(
            target_address(&md),
            Err(TunnelError::MissingAddress(2))
        ));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = dial(&addr, Some(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, TunnelError::Dial { .. }));
        assert!(err.to_string().starts_with(&format!("dial {}", addr)));
    }
}
