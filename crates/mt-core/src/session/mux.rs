//! Control session and stream multiplexing
//!
//! A control session owns one connection between a tunnel client and the
//! tunnel server. Two tasks run per session: a reader that routes incoming
//! frames to their streams, and a writer that serializes outgoing frames.
//!
//! Outgoing frames travel on two queues. Stream data and every frame that
//! ends a stream (`Close`, `Cancel`) go through the bounded data queue, so
//! they never overtake data already sent. `Open`, `WindowUpdate` and
//! session errors go through the unbounded control queue. The writer
//! always drains the control queue first, so `Open` is on the wire before
//! any data of its stream.
//!
//! The reader task never waits on a stream. Each stream has its own
//! credit window (see [`super::window`]), so its inbound queue holds at
//! most one window of data. A peer that sends past its credit gets that
//! one stream reset; its other streams keep flowing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::{CancellationToken, DropGuard};

use mt_protocol::{ErrorCode, Frame, FrameCodec, Message, Metadata, StreamId};

use super::handshake;
use super::stream::TunnelStream;
use super::window::{RecvWindow, SendWindow};
use crate::error::{SessionError, StreamError};

/// Queued outbound data frames per session
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Opened streams waiting for the server to pick them up
const ACCEPT_QUEUE_CAPACITY: usize = 16;

/// Which end of the control connection we are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

/// What a stream's reader half receives
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(Bytes),
    Close(Option<String>),
}

/// Status of a stream reset because the peer overran its window
pub(crate) const WINDOW_EXCEEDED: &str = "flow control window exceeded";

/// Routing entry of one open stream
pub(crate) struct Route {
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    pub(crate) cancel: CancellationToken,
    send_window: Arc<SendWindow>,
    recv_window: Arc<RecvWindow>,
}

/// State shared by the session handle, its tasks and its streams
pub(crate) struct Shared {
    pub(crate) role: Role,
    pub(crate) data_tx: mpsc::Sender<Frame>,
    pub(crate) control_tx: mpsc::UnboundedSender<Frame>,
    pub(crate) routes: DashMap<StreamId, Route>,
    next_id: AtomicU32,
    pub(crate) cancel: CancellationToken,
    peer: String,
}

impl Shared {
    /// Next unused stream id, never the control stream
    fn allocate_id(&self) -> StreamId {
        loop {
            let id = StreamId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !id.is_control() {
                return id;
            }
        }
    }

    /// Error a stream reports once its route is gone
    pub(crate) fn stream_gone(&self) -> StreamError {
        if self.cancel.is_cancelled() {
            StreamError::SessionClosed
        } else {
            StreamError::Cancelled
        }
    }

    /// Cancel the session; stream tokens are children and follow
    fn shutdown(&self) {
        self.cancel.cancel();
        self.routes.clear();
    }

    /// Hand a data chunk to its stream, resetting the stream if the
    /// chunk overruns the stream's receive window
    fn deliver(&self, id: StreamId, chunk: Bytes) {
        let Some(route) = self.routes.get(&id) else {
            tracing::trace!(stream = %id, "dropping frame for unknown stream");
            return;
        };

        let len = u32::try_from(chunk.len()).unwrap_or(u32::MAX);
        if route.recv_window.consume(len) {
            let _ = route.inbound.send(Inbound::Data(chunk));
            return;
        }

        drop(route);
        self.reset(id, WINDOW_EXCEEDED);
    }

    /// End one stream with `reason`, locally and on the peer
    fn reset(&self, id: StreamId, reason: &str) {
        let Some((_, route)) = self.routes.remove(&id) else {
            return;
        };
        tracing::warn!(peer = %self.peer, stream = %id, "resetting stream: {}", reason);

        let _ = route.inbound.send(Inbound::Close(Some(reason.to_string())));
        route.cancel.cancel();

        let message = match self.role {
            Role::Client => Message::Cancel,
            Role::Server => Message::Close {
                error: Some(reason.to_string()),
            },
        };
        self.queue_after_data(Frame::new(id, message));
    }

    /// Return send credit granted by the peer
    fn grant(&self, id: StreamId, increment: u32) {
        if let Some(route) = self.routes.get(&id) {
            route.send_window.grant(increment);
        }
    }

    /// Queue a frame behind the data already sent, without awaiting
    pub(crate) fn queue_after_data(&self, frame: Frame) {
        let frame = match self.data_tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(frame)) => frame,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let data_tx = self.data_tx.clone();
                let cancel = self.cancel.clone();
                handle.spawn(async move {
                    tokio::select! {
                        _ = data_tx.send(frame) => {}
                        _ = cancel.cancelled() => {}
                    }
                });
            }
            Err(_) => {
                let _ = self.control_tx.send(frame);
            }
        }
    }

    fn send_control_error(&self, code: ErrorCode, message: String) {
        let _ = self
            .control_tx
            .send(Frame::control(Message::Error { code, message }));
    }

    /// Register a route for a new stream and build the stream
    fn register(self: &Arc<Self>, id: StreamId, metadata: Metadata) -> TunnelStream {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();
        let send_window = Arc::new(SendWindow::new());
        let recv_window = Arc::new(RecvWindow::new());
        self.routes.insert(
            id,
            Route {
                inbound: inbound_tx,
                cancel: cancel.clone(),
                send_window: Arc::clone(&send_window),
                recv_window: Arc::clone(&recv_window),
            },
        );
        TunnelStream::new(
            id,
            metadata,
            Arc::clone(self),
            inbound_rx,
            cancel,
            send_window,
            recv_window,
        )
    }
}

/// Client handle to a control session
///
/// Cloning is cheap. The session shuts down when the last handle is
/// dropped or [`ControlSession::shutdown`] is called; every stream it
/// carries ends with [`StreamError::SessionClosed`].
#[derive(Clone)]
pub struct ControlSession {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl ControlSession {
    /// Dial the tunnel server and perform the handshake
    ///
    /// `timeout` bounds the TCP connect and the handshake separately.
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, SessionError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SessionError::Timeout(address.to_string()))?
            .map_err(|source| SessionError::Connect {
                address: address.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);

        tokio::time::timeout(timeout, Self::client(stream, address))
            .await
            .map_err(|_| SessionError::Timeout(address.to_string()))?
    }

    /// Run the client side of a session over an established connection
    pub async fn client<T>(io: T, peer: impl Into<String>) -> Result<Self, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (rd, wr) = tokio::io::split(io);
        let mut reader = FramedRead::new(rd, FrameCodec::new());
        let mut writer = FramedWrite::new(wr, FrameCodec::new());

        handshake::client_hello(&mut reader, &mut writer).await?;
        tracing::debug!(%peer, "control session established");

        let (shared, data_rx, control_rx) = new_shared(Role::Client, peer);
        spawn_tasks(&shared, reader, writer, data_rx, control_rx, None);

        Ok(Self {
            _guard: Arc::new(shared.cancel.clone().drop_guard()),
            shared,
        })
    }

    /// Run the server side of a session over an accepted connection
    ///
    /// Fails if the client does not complete the handshake within
    /// `handshake_timeout` or speaks an incompatible protocol version.
    pub async fn accept<T>(
        io: T,
        peer: impl Into<String>,
        handshake_timeout: Duration,
    ) -> Result<IncomingStreams, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (rd, wr) = tokio::io::split(io);
        let mut reader = FramedRead::new(rd, FrameCodec::new());
        let mut writer = FramedWrite::new(wr, FrameCodec::new());

        let version = tokio::time::timeout(
            handshake_timeout,
            handshake::server_hello(&mut reader, &mut writer),
        )
        .await
        .map_err(|_| SessionError::Timeout(peer.clone()))??;
        tracing::debug!(%peer, %version, "control session accepted");

        let (shared, data_rx, control_rx) = new_shared(Role::Server, peer);
        let (incoming_tx, incoming_rx) = mpsc::channel(ACCEPT_QUEUE_CAPACITY);
        spawn_tasks(
            &shared,
            reader,
            writer,
            data_rx,
            control_rx,
            Some(incoming_tx),
        );

        Ok(IncomingStreams {
            rx: incoming_rx,
            _guard: shared.cancel.clone().drop_guard(),
            shared,
        })
    }

    /// Open a new stream carrying `metadata`
    ///
    /// Ids are allocated without locking, so concurrent callers always get
    /// distinct streams.
    pub async fn open_stream(&self, metadata: Metadata) -> Result<TunnelStream, SessionError> {
        if self.shared.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }

        let id = self.shared.allocate_id();
        let stream = self.shared.register(id, metadata.clone());
        self.shared
            .control_tx
            .send(Frame::new(id, Message::Open { metadata }))
            .map_err(|_| SessionError::Closed)?;

        tracing::trace!(stream = %id, "stream opened");
        Ok(stream)
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Wait until the session ends
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await
    }

    /// Server address this session is connected to
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Number of streams currently routed
    pub fn active_streams(&self) -> usize {
        self.shared.routes.len()
    }

    /// End the session and every stream on it
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

/// Server side of a control session: the streams opened by the client
pub struct IncomingStreams {
    rx: mpsc::Receiver<TunnelStream>,
    shared: Arc<Shared>,
    _guard: DropGuard,
}

impl IncomingStreams {
    /// Next stream opened by the client, `None` once the session ended
    pub async fn next(&mut self) -> Option<TunnelStream> {
        tokio::select! {
            stream = self.rx.recv() => stream,
            _ = self.shared.cancel.cancelled() => None,
        }
    }

    /// Client address
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Token cancelled when the session ends
    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Number of streams currently routed
    pub fn active_streams(&self) -> usize {
        self.shared.routes.len()
    }

    /// End the session and every stream on it
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

fn new_shared(
    role: Role,
    peer: String,
) -> (
    Arc<Shared>,
    mpsc::Receiver<Frame>,
    mpsc::UnboundedReceiver<Frame>,
) {
    let (data_tx, data_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        role,
        data_tx,
        control_tx,
        routes: DashMap::new(),
        next_id: AtomicU32::new(1),
        cancel: CancellationToken::new(),
        peer,
    });
    (shared, data_rx, control_rx)
}

fn spawn_tasks<R, W>(
    shared: &Arc<Shared>,
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
    data_rx: mpsc::Receiver<Frame>,
    control_rx: mpsc::UnboundedReceiver<Frame>,
    incoming: Option<mpsc::Sender<TunnelStream>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(write_loop(Arc::clone(shared), writer, data_rx, control_rx));
    tokio::spawn(read_loop(Arc::clone(shared), reader, incoming));
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    mut writer: FramedWrite<W, FrameCodec>,
    mut data_rx: mpsc::Receiver<Frame>,
    mut control_rx: mpsc::UnboundedReceiver<Frame>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            Some(frame) = control_rx.recv() => frame,
            Some(frame) = data_rx.recv() => frame,
            else => break,
        };

        if let Err(e) = writer.send(frame).await {
            tracing::warn!(peer = %shared.peer, "control connection write failed: {}", e);
            break;
        }
    }

    shared.shutdown();
    tracing::debug!(peer = %shared.peer, "writer stopped");
}

async fn read_loop<R>(
    shared: Arc<Shared>,
    mut reader: FramedRead<R, FrameCodec>,
    incoming: Option<mpsc::Sender<TunnelStream>>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => match shared.role {
                Role::Client => dispatch_client(&shared, frame),
                Role::Server => dispatch_server(&shared, frame, incoming.as_ref()).await,
            },
            Some(Err(e)) => {
                tracing::warn!(peer = %shared.peer, "protocol error: {}", e);
                break;
            }
            None => {
                tracing::debug!(peer = %shared.peer, "control connection closed by peer");
                break;
            }
        }
    }

    shared.shutdown();
}

fn dispatch_client(shared: &Arc<Shared>, frame: Frame) {
    let id = frame.stream_id;
    match frame.message {
        Message::Data(chunk) => shared.deliver(id, chunk),
        Message::WindowUpdate { increment } => shared.grant(id, increment),
        Message::Close { error } => {
            if let Some((_, route)) = shared.routes.remove(&id) {
                let _ = route.inbound.send(Inbound::Close(error));
            }
        }
        Message::Error { code, message } => {
            tracing::warn!(peer = %shared.peer, ?code, "server reported error: {}", message);
        }
        other => {
            tracing::warn!(
                stream = %id,
                "unexpected {:?} from server",
                other.message_type()
            );
        }
    }
}

async fn dispatch_server(
    shared: &Arc<Shared>,
    frame: Frame,
    incoming: Option<&mpsc::Sender<TunnelStream>>,
) {
    let id = frame.stream_id;
    match frame.message {
        Message::Open { metadata } => {
            if id.is_control() || shared.routes.contains_key(&id) {
                tracing::warn!(stream = %id, "rejecting open of a stream id in use");
                shared.send_control_error(
                    ErrorCode::DuplicateStream,
                    format!("{} is already in use", id),
                );
                return;
            }

            let stream = shared.register(id, metadata);
            let Some(incoming) = incoming else {
                return;
            };
            tokio::select! {
                result = incoming.send(stream) => {
                    if result.is_err() {
                        tracing::debug!(stream = %id, "no acceptor for stream");
                    }
                }
                _ = shared.cancel.cancelled() => {}
            }
        }
        Message::Data(chunk) => shared.deliver(id, chunk),
        Message::WindowUpdate { increment } => shared.grant(id, increment),
        Message::Cancel => {
            if let Some((_, route)) = shared.routes.remove(&id) {
                tracing::debug!(stream = %id, "stream cancelled by client");
                route.cancel.cancel();
            }
        }
        Message::Error { code, message } => {
            tracing::warn!(peer = %shared.peer, ?code, "client reported error: {}", message);
        }
        other => {
            tracing::warn!(
                stream = %id,
                "unexpected {:?} from client",
                other.message_type()
            );
            shared.send_control_error(
                ErrorCode::InvalidMessage,
                format!("unexpected {:?} on {}", other.message_type(), id),
            );
        }
    }
}
