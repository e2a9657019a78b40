//! Control sessions between tunnel client and tunnel server
//!
//! The client holds a [`ControlSession`] and opens one [`TunnelStream`] per
//! tunneled connection. The server accepts a session and receives those
//! streams through [`IncomingStreams`].

mod handshake;
mod mux;
mod stream;
mod window;

pub use handshake::is_compatible;
pub use mux::{ControlSession, IncomingStreams, OUTBOUND_QUEUE_CAPACITY};
pub use stream::{StreamReader, StreamWriter, TunnelStream, HANDLER_EXITED};
pub use window::MAX_DATA_FRAME;
