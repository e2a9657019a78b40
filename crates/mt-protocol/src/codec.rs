//! Tokio codec for framed protocol messages

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{Frame, Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
///
/// Nothing is consumed from the read buffer until a whole frame is there.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = Header::peek(src)? else {
            return Ok(None);
        };

        let frame_len = HEADER_SIZE + header.payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(header.payload_len);
        let message: Message = bincode::deserialize(&payload)?;

        if message.message_type() != header.message_type {
            return Err(ProtocolError::TypeMismatch {
                header: header.message_type,
                payload: message.message_type(),
            });
        }

        Ok(Some(Frame::new(header.stream_id, message)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&frame.message)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        Header {
            stream_id: frame.stream_id,
            message_type: frame.message.message_type(),
            payload_len: payload.len(),
        }
        .write(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::metadata::Metadata;
    use crate::stream::StreamId;
    use bytes::{BufMut, Bytes};

    #[test]
    fn test_open_frame_carries_metadata() {
        let mut codec = FrameCodec::new();
        let frame = Frame::new(
            StreamId::new(3),
            Message::Open {
                metadata: Metadata::with_addr("auth:9004"),
            },
        );

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_consecutive_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::new(StreamId::new(1), Message::Data(Bytes::from("ping"))),
                &mut buf,
            )
            .unwrap();
        codec
            .encode(
                Frame::new(StreamId::new(1), Message::Close { error: None }),
                &mut buf,
            )
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.message, Message::Data(Bytes::from("ping")));
        assert_eq!(second.message, Message::Close { error: None });
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let frame = Frame::new(StreamId::new(9), Message::Data(Bytes::from(vec![7u8; 4096])));

        let mut full = BytesMut::new();
        codec.encode(frame.clone(), &mut full).unwrap();

        // Header plus a few payload bytes: nothing is consumed yet
        let mut partial = full.split_to(HEADER_SIZE + 10);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_SIZE + 10);

        partial.extend_from_slice(&full);
        assert_eq!(codec.decode(&mut partial).unwrap().unwrap(), frame);
    }

    #[test]
    fn test_max_length_header_waits_for_payload() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u8(MessageType::Data.as_u8());
        buf.put_u8(0xFF);
        buf.put_u16(0xFFFF);

        // 0xFFFFFF is exactly the maximum, so it must wait for data, not fail
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut codec = FrameCodec::new();
        let payload = bincode::serialize(&Message::Cancel).unwrap();

        let mut buf = BytesMut::new();
        Header {
            stream_id: StreamId::new(1),
            message_type: MessageType::Data,
            payload_len: payload.len(),
        }
        .write(&mut buf);
        buf.extend_from_slice(&payload);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::TypeMismatch { .. })
        ));
    }
}
