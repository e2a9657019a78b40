//! Version handshake on the control stream

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use mt_protocol::{ErrorCode, Frame, FrameCodec, Message, PROTOCOL_VERSION};

use crate::error::SessionError;

/// Major component of a "MAJOR.MINOR" version string
fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Whether a peer speaking `version` can talk to us
pub fn is_compatible(version: &str) -> bool {
    major(version) == major(PROTOCOL_VERSION)
}

/// Send `Hello` and wait for the server's answer
pub(super) async fn client_hello<R, W>(
    reader: &mut FramedRead<R, FrameCodec>,
    writer: &mut FramedWrite<W, FrameCodec>,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .send(Frame::control(Message::Hello {
            version: PROTOCOL_VERSION.to_string(),
        }))
        .await?;

    match reader.next().await {
        Some(Ok(frame)) => match frame.message {
            Message::HelloAck { accepted: true, .. } => Ok(()),
            Message::HelloAck {
                accepted: false,
                reason,
            } => Err(SessionError::Rejected(
                reason.unwrap_or_else(|| "no reason given".to_string()),
            )),
            Message::Error { message, .. } => Err(SessionError::Rejected(message)),
            other => Err(SessionError::Handshake(format!(
                "expected HelloAck, got {:?}",
                other.message_type()
            ))),
        },
        Some(Err(e)) => Err(e.into()),
        None => Err(SessionError::Closed),
    }
}

/// Wait for the client's `Hello` and answer it
///
/// Returns the version the client announced.
pub(super) async fn server_hello<R, W>(
    reader: &mut FramedRead<R, FrameCodec>,
    writer: &mut FramedWrite<W, FrameCodec>,
) -> Result<String, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let frame = match reader.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return Err(e.into()),
        None => return Err(SessionError::Closed),
    };

    let version = match frame.message {
        Message::Hello { version } if frame.stream_id.is_control() => version,
        other => {
            let message = format!("expected Hello, got {:?}", other.message_type());
            writer
                .send(Frame::control(Message::Error {
                    code: ErrorCode::InvalidMessage,
                    message: message.clone(),
                }))
                .await?;
            return Err(SessionError::Handshake(message));
        }
    };

    if !is_compatible(&version) {
        let reason = format!(
            "unsupported protocol version {}, server speaks {}",
            version, PROTOCOL_VERSION
        );
        writer
            .send(Frame::control(Message::HelloAck {
                accepted: false,
                reason: Some(reason.clone()),
            }))
            .await?;
        return Err(SessionError::Rejected(reason));
    }

    writer
        .send(Frame::control(Message::HelloAck {
            accepted: true,
            reason: None,
        }))
        .await?;

    Ok(version)
}
