//! Message-stream endpoint traits
//!
//! A message stream moves whole chunks rather than bytes. The bridge only
//! needs these two operations.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StreamError;

/// Receiving half of a message stream
#[async_trait]
pub trait MessageReceiver: Send {
    /// Next chunk, or `None` once the peer ended the stream cleanly
    async fn receive(&mut self) -> Result<Option<Bytes>, StreamError>;
}

/// Sending half of a message stream
#[async_trait]
pub trait MessageSender: Send {
    /// Send one chunk
    async fn send(&mut self, chunk: Bytes) -> Result<(), StreamError>;
}
