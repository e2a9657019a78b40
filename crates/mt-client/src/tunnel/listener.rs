//! One local listener and the connections it forwards

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mt_core::address::AddressSpec;
use mt_core::bridge::bridge;
use mt_protocol::Metadata;

use super::dialer::SessionDialer;

/// Pause after a failed accept before trying again
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept connections on `listener` until `cancel` fires
///
/// Every connection is forwarded in its own task. On cancel the in-flight
/// forwards are aborted.
pub(super) async fn serve_listener(
    listener: TcpListener,
    spec: AddressSpec,
    dialer: Arc<SessionDialer>,
    cancel: CancellationToken,
) {
    let local = spec.bind_address();
    tracing::info!(%local, remote = %spec.remote_address(), "tunnel listening");

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = listener.accept() => match result {
                Ok((socket, peer)) => {
                    connections.spawn(forward(socket, peer, spec.clone(), Arc::clone(&dialer)));
                }
                Err(e) => {
                    tracing::warn!(%local, "Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },

            Some(result) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = result {
                    tracing::warn!(%local, "connection task failed: {}", e);
                }
            }
        }
    }

    connections.shutdown().await;
    tracing::info!(%local, "tunnel stopped");
}

/// Forward one local connection through a new stream
async fn forward(socket: TcpStream, peer: SocketAddr, spec: AddressSpec, dialer: Arc<SessionDialer>) {
    let local = spec.bind_address();
    let remote = spec.remote_address();
    let _ = socket.set_nodelay(true);

    let mut stream = match dialer.open_stream(Metadata::with_addr(remote.clone())).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(%peer, %local, %remote, "Failed to open tunnel: {}", e);
            return;
        }
    };
    let id = stream.id();
    tracing::debug!(%peer, %local, %remote, stream = %id, "connection accepted");

    let (reader, writer) = stream.halves();
    match bridge(reader, writer, socket).await {
        Ok(()) => tracing::debug!(%peer, stream = %id, "connection closed"),
        Err(e) if e.is_cancellation() => {
            tracing::debug!(%peer, stream = %id, "connection ended with its stream: {}", e)
        }
        Err(e) => tracing::warn!(
            %peer,
            %local,
            %remote,
            stream = %id,
            direction = %e.direction,
            "Error tunneling data: {}",
            e
        ),
    }
}
