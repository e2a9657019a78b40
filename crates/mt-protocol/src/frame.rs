//! Frames and their wire header
//!
//! ```text
//! 0        4      5               8
//! +--------+------+---------------+----------------
//! | stream | type | payload (u24) | payload bytes…
//! +--------+------+---------------+----------------
//! ```
//!
//! All integers are big-endian. The payload is the bincode encoding of the
//! [`Message`].

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::{Message, MessageType};
use crate::stream::StreamId;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload the 24-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = (1 << 24) - 1;

/// A complete frame: the stream it is addressed to and its message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream this frame belongs to
    pub stream_id: StreamId,
    /// The message payload
    pub message: Message,
}

impl Frame {
    /// Create a new frame
    pub fn new(stream_id: StreamId, message: Message) -> Self {
        Self { stream_id, message }
    }

    /// Frame on the control stream
    pub fn control(message: Message) -> Self {
        Self::new(StreamId::CONTROL, message)
    }
}

/// Header fields of a buffered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) stream_id: StreamId,
    pub(crate) message_type: MessageType,
    pub(crate) payload_len: usize,
}

impl Header {
    /// Read the header at the front of `buf` without consuming it
    ///
    /// `None` while fewer than [`HEADER_SIZE`] bytes are buffered.
    pub(crate) fn peek(buf: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let Some(raw) = buf.get(..HEADER_SIZE) else {
            return Ok(None);
        };

        let message_type =
            MessageType::from_u8(raw[4]).ok_or(ProtocolError::UnknownMessageType(raw[4]))?;
        let stream_id = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let payload_len = u32::from_be_bytes([0, raw[5], raw[6], raw[7]]) as usize;

        Ok(Some(Self {
            stream_id: StreamId::new(stream_id),
            message_type,
            payload_len,
        }))
    }

    /// Append the encoded header to `dst`
    pub(crate) fn write(&self, dst: &mut BytesMut) {
        let len = (self.payload_len as u32).to_be_bytes();
        dst.put_u32(self.stream_id.as_u32());
        dst.put_u8(self.message_type.as_u8());
        dst.put_slice(&len[1..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header {
            stream_id: StreamId::new(0x0102_0304),
            message_type: MessageType::Data,
            payload_len: 0x0A0B0C,
        };

        let mut buf = BytesMut::new();
        header.write(&mut buf);

        assert_eq!(&buf[..], &[0x01, 0x02, 0x03, 0x04, 0x04, 0x0A, 0x0B, 0x0C]);
        assert_eq!(Header::peek(&buf).unwrap(), Some(header));
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn test_largest_length_fits() {
        let mut buf = BytesMut::new();
        Header {
            stream_id: StreamId::new(7),
            message_type: MessageType::Data,
            payload_len: MAX_PAYLOAD_SIZE,
        }
        .write(&mut buf);

        let header = Header::peek(&buf).unwrap().unwrap();
        assert_eq!(header.payload_len, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_short_buffer() {
        assert!(Header::peek(&[0u8; HEADER_SIZE - 1]).unwrap().is_none());
    }

    #[test]
    fn test_unknown_message_type() {
        let result = Header::peek(&[0, 0, 0, 1, 0x7E, 0, 0, 10]);
        assert!(matches!(result, Err(ProtocolError::UnknownMessageType(0x7E))));
    }
}
