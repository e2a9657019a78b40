//! Bidirectional relay between a message stream and a byte stream
//!
//! The bridge copies in both directions at once and finishes as soon as
//! either direction finishes, cleanly or not. The other direction is
//! dropped at that point; its result is never reported. Dropping the byte
//! stream closes the socket, which is what unblocks the remote side.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StreamError;
use crate::traits::{MessageReceiver, MessageSender};

/// Read buffer for the socket -> tunnel direction (1 MiB)
pub const BRIDGE_BUFFER_SIZE: usize = 1 << 20;

/// Copy direction, seen from the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Tunnel -> socket
    Inbound,
    /// Socket -> tunnel
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "from tunnel"),
            Direction::Outbound => write!(f, "to tunnel"),
        }
    }
}

/// The operation that failed inside one copy direction
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("receiving data: {0}")]
    Receive(#[source] StreamError),

    #[error("writing data: {0}")]
    Write(#[source] std::io::Error),

    #[error("reading data: {0}")]
    Read(#[source] std::io::Error),

    #[error("sending data: {0}")]
    Send(#[source] StreamError),
}

/// A bridge ended because one direction failed
#[derive(Debug, Error)]
#[error("copy data {direction}: {source}")]
pub struct RelayError {
    /// Direction that failed
    pub direction: Direction,
    /// What went wrong
    #[source]
    pub source: CopyError,
}

impl RelayError {
    /// Whether the failure is the stream being cancelled or its session
    /// going away, as opposed to an I/O or remote error
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.source,
            CopyError::Receive(StreamError::Cancelled | StreamError::SessionClosed)
                | CopyError::Send(StreamError::Cancelled | StreamError::SessionClosed)
        )
    }
}

/// Relay between `receiver`/`sender` and `io` until either side ends
///
/// `io` is consumed and dropped when the bridge returns.
pub async fn bridge<R, S, T>(receiver: &mut R, sender: &mut S, io: T) -> Result<(), RelayError>
where
    R: MessageReceiver + ?Sized,
    S: MessageSender + ?Sized,
    T: AsyncRead + AsyncWrite + Send,
{
    let (mut reader, mut writer) = tokio::io::split(io);

    let (direction, result) = tokio::select! {
        r = copy_inbound(receiver, &mut writer) => (Direction::Inbound, r),
        r = copy_outbound(&mut reader, sender) => (Direction::Outbound, r),
    };

    match result {
        Ok(bytes) => {
            tracing::debug!(%direction, bytes, "bridge finished");
            Ok(())
        }
        Err(source) => Err(RelayError { direction, source }),
    }
}

async fn copy_inbound<R, W>(receiver: &mut R, writer: &mut W) -> Result<u64, CopyError>
where
    R: MessageReceiver + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        match receiver.receive().await.map_err(CopyError::Receive)? {
            Some(chunk) => {
                writer.write_all(&chunk).await.map_err(CopyError::Write)?;
                total += chunk.len() as u64;
            }
            None => {
                writer.flush().await.map_err(CopyError::Write)?;
                return Ok(total);
            }
        }
    }
}

async fn copy_outbound<S, Rd>(reader: &mut Rd, sender: &mut S) -> Result<u64, CopyError>
where
    S: MessageSender + ?Sized,
    Rd: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; BRIDGE_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(CopyError::Read)?;
        if n == 0 {
            return Ok(total);
        }
        sender
            .send(Bytes::copy_from_slice(&buf[..n]))
            .await
            .map_err(CopyError::Send)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Yields scripted results, then blocks forever like an idle peer
    struct ScriptedReceiver(mpsc::UnboundedReceiver<Result<Option<Bytes>, StreamError>>);

    #[async_trait]
    impl MessageReceiver for ScriptedReceiver {
        async fn receive(&mut self) -> Result<Option<Bytes>, StreamError> {
            match self.0.recv().await {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSender {
        chunks: Arc<Mutex<Vec<Bytes>>>,
        fail_with: Option<StreamError>,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<u8> {
            self.chunks.lock().unwrap().concat()
        }

        fn calls(&self) -> usize {
            self.chunks.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&mut self, chunk: Bytes) -> Result<(), StreamError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            self.chunks.lock().unwrap().push(chunk);
            Ok(())
        }
    }

    fn scripted() -> (
        mpsc::UnboundedSender<Result<Option<Bytes>, StreamError>>,
        ScriptedReceiver,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ScriptedReceiver(rx))
    }

    #[tokio::test]
    async fn test_socket_eof_finishes_cleanly() {
        let (_tx, mut receiver) = scripted();
        let mut sender = RecordingSender::default();
        let (local, mut peer) = tokio::io::duplex(64);

        peer.write_all(b"hello").await.unwrap();
        drop(peer);

        let result = bridge(&mut receiver, &mut sender, local).await;
        assert!(result.is_ok());
        assert_eq!(sender.sent(), b"hello");

        let calls = sender.calls();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sender.calls(), calls);
    }

    #[tokio::test]
    async fn test_stream_end_finishes_cleanly() {
        let (tx, mut receiver) = scripted();
        let mut sender = RecordingSender::default();
        let (local, mut peer) = tokio::io::duplex(64);

        tx.send(Ok(Some(Bytes::from_static(b"abc")))).unwrap();
        tx.send(Ok(None)).unwrap();

        bridge(&mut receiver, &mut sender, local).await.unwrap();

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abc");
    }

    #[tokio::test]
    async fn test_receive_error_reports_inbound() {
        let (tx, mut receiver) = scripted();
        let mut sender = RecordingSender::default();
        let (local, mut peer) = tokio::io::duplex(64);

        tx.send(Err(StreamError::Remote("boom".to_string()))).unwrap();

        let err = bridge(&mut receiver, &mut sender, local).await.unwrap_err();
        assert_eq!(err.direction, Direction::Inbound);
        assert!(matches!(err.source, CopyError::Receive(StreamError::Remote(_))));
        assert!(!err.is_cancellation());
        assert!(err.to_string().contains("from tunnel"));

        // The socket is closed and the outbound copy no longer runs
        assert!(peer.write_all(b"late").await.is_err());
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn test_send_error_reports_outbound() {
        let (_tx, mut receiver) = scripted();
        let mut sender = RecordingSender {
            fail_with: Some(StreamError::SessionClosed),
            ..Default::default()
        };
        let (local, mut peer) = tokio::io::duplex(64);

        peer.write_all(b"data").await.unwrap();

        let err = bridge(&mut receiver, &mut sender, local).await.unwrap_err();
        assert_eq!(err.direction, Direction::Outbound);
        assert!(matches!(err.source, CopyError::Send(StreamError::SessionClosed)));
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_chunks_keep_order() {
        let (tx, mut receiver) = scripted();
        let mut sender = RecordingSender::default();
        let (local, mut peer) = tokio::io::duplex(1024);

        for part in ["one ", "two ", "three"] {
            tx.send(Ok(Some(Bytes::from(part)))).unwrap();
        }
        tx.send(Ok(None)).unwrap();

        bridge(&mut receiver, &mut sender, local).await.unwrap();

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "one two three");
    }
}
