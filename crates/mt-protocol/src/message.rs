//! Message types for the tunnel protocol
//!
//! This module defines the messages exchanged between the tunnel client and
//! the tunnel server. Messages are serialized into frames using the codec
//! defined in `codec.rs`.
//!
//! # Message Flow
//!
//! 1. Client connects and sends `Hello` on the control stream
//! 2. Server responds with `HelloAck`
//! 3. For every tunneled connection the client allocates a fresh stream id
//!    and sends `Open` carrying the target address as metadata
//! 4. `Data` messages flow in both directions on that stream. Each side
//!    may only send as many payload bytes as the peer has granted through
//!    `WindowUpdate`, starting from [`STREAM_WINDOW`]
//! 5. The server ends the stream with `Close` once its handler returns;
//!    the client sends `Cancel` when it abandons a stream early

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Current protocol version string.
///
/// Format: "MAJOR.MINOR" where MAJOR changes indicate breaking changes.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Payload bytes each side may send on a fresh stream before the peer
/// grants more with `WindowUpdate`
pub const STREAM_WINDOW: u32 = 1024 * 1024;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Handshake (client -> server)
    Hello = 0x01,
    /// Handshake answer
    HelloAck = 0x02,
    /// Open a new stream
    Open = 0x03,
    /// Stream payload
    Data = 0x04,
    /// Server finished the stream
    Close = 0x05,
    /// Client abandoned the stream
    Cancel = 0x06,
    /// Receive credit returned to the sender
    WindowUpdate = 0x07,
    /// Session-level error
    Error = 0xFF,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::HelloAck),
            0x03 => Some(Self::Open),
            0x04 => Some(Self::Data),
            0x05 => Some(Self::Close),
            0x06 => Some(Self::Cancel),
            0x07 => Some(Self::WindowUpdate),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Error codes for session-level error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown error
    Unknown = 0,
    /// Peer speaks an incompatible protocol version
    VersionMismatch = 1,
    /// Message not valid in the current state
    InvalidMessage = 2,
    /// Stream id already in use
    DuplicateStream = 3,
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Handshake sent by the client right after connecting
    Hello {
        /// Protocol version, use `PROTOCOL_VERSION` when sending
        version: String,
    },

    /// Handshake answer
    HelloAck {
        /// Whether the server accepts the session
        accepted: bool,
        /// Reason if not accepted
        reason: Option<String>,
    },

    /// Open a stream. Sent once, before any data on the stream.
    Open {
        /// Stream metadata (the tunnel target lives under `addr`)
        metadata: Metadata,
    },

    /// One chunk of stream payload
    Data(Bytes),

    /// The server side of the stream is done.
    ///
    /// `None` is a clean end-of-stream; `Some` is the terminal error status.
    Close {
        /// Error reported by the stream handler
        error: Option<String>,
    },

    /// The client no longer wants the stream
    Cancel,

    /// The receiver drained `increment` more payload bytes of this stream
    WindowUpdate {
        /// Bytes of credit handed back to the sender
        increment: u32,
    },

    /// Session-level error
    Error {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::HelloAck { .. } => MessageType::HelloAck,
            Message::Open { .. } => MessageType::Open,
            Message::Data(_) => MessageType::Data,
            Message::Close { .. } => MessageType::Close,
            Message::Cancel => MessageType::Cancel,
            Message::WindowUpdate { .. } => MessageType::WindowUpdate,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Whether this message ends its stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Close { .. } | Message::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::Hello,
            MessageType::HelloAck,
            MessageType::Open,
            MessageType::Data,
            MessageType::Close,
            MessageType::Cancel,
            MessageType::WindowUpdate,
            MessageType::Error,
        ] {
            let byte = msg_type.as_u8();
            let recovered = MessageType::from_u8(byte).unwrap();
            assert_eq!(recovered, msg_type);
        }
    }

    #[test]
    fn test_unknown_type_byte() {
        assert_eq!(MessageType::from_u8(0x42), None);
    }

    #[test]
    fn test_terminal_messages() {
        assert!(Message::Cancel.is_terminal());
        assert!(Message::Close { error: None }.is_terminal());
        assert!(!Message::Data(Bytes::from_static(b"x")).is_terminal());
        assert!(!Message::WindowUpdate { increment: 1 }.is_terminal());
    }
}
