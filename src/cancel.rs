//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Caller-held cancellation token. Cloning yields handles onto the same
/// token; tripping any clone trips them all. Every channel operation and
/// file-I/O loop inside a sort observes the token, so cancellation takes
/// effect even while the pipeline is blocked on a full or empty channel.
#[derive(Clone, Debug)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
    guard: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (guard, signal) = bounded(0);
        CancelToken {
            canceled: Arc::new(AtomicBool::new(false)),
            guard: Arc::new(Mutex::new(Some(guard))),
            signal,
        }
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        // dropping the sender disconnects `signal`, waking every select
        // that is parked on it
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Channel that disconnects once the token trips; select on it to
    /// interrupt a blocking send or receive.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
