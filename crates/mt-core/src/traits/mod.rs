//! Core trait definitions

mod stream;

pub use stream::{MessageReceiver, MessageSender};
