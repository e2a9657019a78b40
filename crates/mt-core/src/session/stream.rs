//! One logical stream inside a control session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mt_protocol::{Frame, Message, Metadata, StreamId};

use super::mux::{Inbound, Role, Shared};
use super::window::{RecvWindow, SendWindow, MAX_DATA_FRAME, WINDOW_UPDATE_THRESHOLD};
use crate::error::StreamError;
use crate::traits::{MessageReceiver, MessageSender};

/// Status sent for a server stream dropped without [`TunnelStream::finish`]
pub const HANDLER_EXITED: &str = "stream handler exited";

/// Owns the stream's route; ends the stream on the wire when dropped
struct StreamInner {
    id: StreamId,
    shared: Arc<Shared>,
    finished: AtomicBool,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let routed = self.shared.routes.remove(&self.id).is_some();
        if !routed || self.shared.cancel.is_cancelled() {
            return;
        }

        let message = match self.shared.role {
            Role::Client => Message::Cancel,
            Role::Server if !self.finished.load(Ordering::Acquire) => Message::Close {
                error: Some(HANDLER_EXITED.to_string()),
            },
            Role::Server => return,
        };
        tracing::trace!(stream = %self.id, "ending dropped stream");
        self.shared.queue_after_data(Frame::new(self.id, message));
    }
}

/// A tunneled stream
///
/// Client streams are cancelled on the server when dropped. Server streams
/// report their terminal status through [`TunnelStream::finish`].
pub struct TunnelStream {
    metadata: Metadata,
    cancel: CancellationToken,
    reader: StreamReader,
    writer: StreamWriter,
}

impl TunnelStream {
    pub(crate) fn new(
        id: StreamId,
        metadata: Metadata,
        shared: Arc<Shared>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        cancel: CancellationToken,
        send_window: Arc<SendWindow>,
        recv_window: Arc<RecvWindow>,
    ) -> Self {
        let inner = Arc::new(StreamInner {
            id,
            shared,
            finished: AtomicBool::new(false),
        });
        Self {
            metadata,
            reader: StreamReader {
                inbound,
                done: false,
                window: recv_window,
                drained: 0,
                inner: Arc::clone(&inner),
            },
            writer: StreamWriter {
                cancel: cancel.clone(),
                window: send_window,
                inner,
            },
            cancel,
        }
    }

    /// Stream id
    pub fn id(&self) -> StreamId {
        self.reader.inner.id
    }

    /// Metadata sent when the stream was opened
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Token cancelled when the peer abandons the stream or the session ends
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Borrow both halves at once, for a bridge
    pub fn halves(&mut self) -> (&mut StreamReader, &mut StreamWriter) {
        (&mut self.reader, &mut self.writer)
    }

    /// End a server stream with `error` as its status, `None` for success
    ///
    /// The status is queued behind any data already sent on the stream.
    pub async fn finish(self, error: Option<String>) {
        let inner = Arc::clone(&self.reader.inner);
        inner.finished.store(true, Ordering::Release);
        inner.shared.routes.remove(&inner.id);
        drop(self);

        if inner.shared.role != Role::Server || inner.shared.cancel.is_cancelled() {
            return;
        }

        let frame = Frame::new(inner.id, Message::Close { error });
        tokio::select! {
            _ = inner.shared.data_tx.send(frame) => {}
            _ = inner.shared.cancel.cancelled() => {}
        }
    }
}

#[async_trait]
impl MessageReceiver for TunnelStream {
    async fn receive(&mut self) -> Result<Option<Bytes>, StreamError> {
        self.reader.receive().await
    }
}

#[async_trait]
impl MessageSender for TunnelStream {
    async fn send(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        self.writer.send(chunk).await
    }
}

/// Receiving half of a [`TunnelStream`]
pub struct StreamReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    done: bool,
    window: Arc<RecvWindow>,
    /// Bytes handed out since the last `WindowUpdate`
    drained: u32,
    inner: Arc<StreamInner>,
}

impl StreamReader {
    /// Return credit to the peer once enough bytes were drained
    fn return_credit(&mut self, bytes: usize) {
        self.drained = self
            .drained
            .saturating_add(u32::try_from(bytes).unwrap_or(u32::MAX));
        if self.drained < WINDOW_UPDATE_THRESHOLD {
            return;
        }

        let increment = std::mem::take(&mut self.drained);
        self.window.restore(increment);
        let _ = self.inner.shared.control_tx.send(Frame::new(
            self.inner.id,
            Message::WindowUpdate { increment },
        ));
    }
}

#[async_trait]
impl MessageReceiver for StreamReader {
    async fn receive(&mut self) -> Result<Option<Bytes>, StreamError> {
        if self.done {
            return Ok(None);
        }

        match self.inbound.recv().await {
            Some(Inbound::Data(chunk)) => {
                self.return_credit(chunk.len());
                Ok(Some(chunk))
            }
            Some(Inbound::Close(None)) => {
                self.done = true;
                Ok(None)
            }
            Some(Inbound::Close(Some(error))) => {
                self.done = true;
                Err(StreamError::Remote(error))
            }
            None => Err(self.inner.shared.stream_gone()),
        }
    }
}

/// Sending half of a [`TunnelStream`]
pub struct StreamWriter {
    cancel: CancellationToken,
    window: Arc<SendWindow>,
    inner: Arc<StreamInner>,
}

#[async_trait]
impl MessageSender for StreamWriter {
    /// Send `chunk` as one or more data frames
    ///
    /// Waits while the peer has not granted enough credit.
    async fn send(&mut self, mut chunk: Bytes) -> Result<(), StreamError> {
        let shared = &self.inner.shared;
        if self.cancel.is_cancelled() {
            return Err(shared.stream_gone());
        }

        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk.len().min(MAX_DATA_FRAME));
            tokio::select! {
                _ = self.window.reserve(piece.len() as u32) => {}
                _ = self.cancel.cancelled() => return Err(shared.stream_gone()),
            }

            let frame = Frame::new(self.inner.id, Message::Data(piece));
            tokio::select! {
                result = shared.data_tx.send(frame) => {
                    result.map_err(|_| StreamError::SessionClosed)?
                }
                _ = self.cancel.cancelled() => return Err(shared.stream_gone()),
            }
        }
        Ok(())
    }
}
