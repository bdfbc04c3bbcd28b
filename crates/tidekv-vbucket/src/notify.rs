//! Client completion notification.

use std::sync::Mutex;

use tidekv_durability::Cookie;

/// Terminal outcome of a durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWriteOutcome {
    /// The write reached its durability requirements and committed.
    Committed,
    /// The write timed out and was aborted.
    Aborted,
}

/// Hook used to wake the client waiting on a durable write.
///
/// Invoked synchronously right after the vBucket's commit or abort for
/// the write completes, outside any monitor lock.
pub trait ClientNotifier: Send + Sync {
    /// A durable write identified by `cookie` reached its outcome.
    fn sync_write_complete(&self, cookie: Cookie, outcome: SyncWriteOutcome);
}

/// Notifier that records completions in order; the front-end wires a
/// real connection-waking implementation instead.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    completions: Mutex<Vec<(Cookie, SyncWriteOutcome)>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The completions recorded so far, in notification order.
    pub fn completions(&self) -> Vec<(Cookie, SyncWriteOutcome)> {
        match self.completions.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => panic!("notifier lock poisoned"),
        }
    }
}

impl ClientNotifier for RecordingNotifier {
    fn sync_write_complete(&self, cookie: Cookie, outcome: SyncWriteOutcome) {
        match self.completions.lock() {
            Ok(mut guard) => guard.push((cookie, outcome)),
            Err(_) => panic!("notifier lock poisoned"),
        }
    }
}
