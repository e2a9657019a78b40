//! mt-protocol: Wire protocol for tunnel stream multiplexing
//!
//! This crate defines the binary protocol spoken between the tunnel client
//! and the tunnel server over their single control connection. Every
//! tunneled TCP connection becomes one logical stream inside it.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod metadata;
pub mod stream;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{Frame, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{ErrorCode, Message, MessageType, PROTOCOL_VERSION, STREAM_WINDOW};
pub use metadata::{Metadata, ADDR_KEY};
pub use stream::StreamId;
