//! Per-stream flow control windows
//!
//! Every stream starts with [`STREAM_WINDOW`] bytes of credit in each
//! direction. A sender spends credit for every data byte it writes; the
//! receiver hands credit back with `WindowUpdate` once its consumer has
//! drained the bytes. A stream whose consumer stops reading therefore
//! stops its peer's sender instead of the session reader.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Semaphore;

use mt_protocol::STREAM_WINDOW;

/// Largest payload of a single data frame
pub const MAX_DATA_FRAME: usize = 64 * 1024;

/// Drained bytes a receiver collects before returning them as credit
pub(crate) const WINDOW_UPDATE_THRESHOLD: u32 = STREAM_WINDOW / 4;

/// Credit this side may still spend sending on a stream
pub(crate) struct SendWindow {
    credit: Semaphore,
}

impl SendWindow {
    pub(crate) fn new() -> Self {
        Self {
            credit: Semaphore::new(STREAM_WINDOW as usize),
        }
    }

    /// Wait until `bytes` of credit are available and spend them
    pub(crate) async fn reserve(&self, bytes: u32) {
        match self.credit.acquire_many(bytes).await {
            Ok(permit) => permit.forget(),
            // The semaphore is never closed
            Err(_) => std::future::pending().await,
        }
    }

    /// Add credit returned by the peer, never past a full window
    pub(crate) fn grant(&self, bytes: u32) {
        let room = (STREAM_WINDOW as usize).saturating_sub(self.credit.available_permits());
        self.credit.add_permits(room.min(bytes as usize));
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.credit.available_permits()
    }
}

/// Credit the peer may still spend sending to us on a stream
pub(crate) struct RecvWindow {
    remaining: AtomicU32,
}

impl RecvWindow {
    pub(crate) fn new() -> Self {
        Self {
            remaining: AtomicU32::new(STREAM_WINDOW),
        }
    }

    /// Account for `bytes` arriving; false if the peer overran its credit
    pub(crate) fn consume(&self, bytes: u32) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                left.checked_sub(bytes)
            })
            .is_ok()
    }

    /// Make `bytes` of drained data available to the peer again
    pub(crate) fn restore(&self, bytes: u32) {
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                Some(left.saturating_add(bytes).min(STREAM_WINDOW))
            });
    }
}
