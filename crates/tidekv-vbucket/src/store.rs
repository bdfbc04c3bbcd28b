//! The durable store backing a vBucket.
//!
//! Implements the monitor's [`VBucketHandle`] seam: terminal outcomes
//! land in the committed/aborted ledgers and the waiting client is
//! woken through the notifier. The commit and abort paths cannot fail;
//! an internal failure here would mean the monitor and the store have
//! diverged, which is unrecoverable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::notify::{ClientNotifier, SyncWriteOutcome};
use tidekv_durability::{Cookie, StoredKey, VBucketHandle, VBucketState};

/// A write that reached its terminal outcome.
#[derive(Debug, Clone)]
pub struct CompletedWrite {
    /// The document key.
    pub key: StoredKey,
    /// The prepare's seqno.
    pub prepare_seqno: u64,
    /// The client cookie that waited on the write.
    pub cookie: Cookie,
}

/// Committed/aborted ledgers, persistence watermark and state shared
/// between the vBucket facade and the durability monitor.
pub struct DurableStore {
    committed: Mutex<Vec<CompletedWrite>>,
    aborted: Mutex<Vec<CompletedWrite>>,
    persistence_seqno: AtomicU64,
    state: Mutex<VBucketState>,
    notifier: Arc<dyn ClientNotifier>,
}

impl DurableStore {
    /// Create an active store wired to `notifier`.
    pub fn new(notifier: Arc<dyn ClientNotifier>) -> Self {
        Self {
            committed: Mutex::new(Vec::new()),
            aborted: Mutex::new(Vec::new()),
            persistence_seqno: AtomicU64::new(0),
            state: Mutex::new(VBucketState::Active),
            notifier,
        }
    }

    /// Record that the flusher persisted everything up to `seqno`.
    pub fn set_persistence_seqno(&self, seqno: u64) {
        self.persistence_seqno.store(seqno, Ordering::SeqCst);
    }

    /// Change the vBucket's replication role.
    pub fn set_state(&self, state: VBucketState) {
        *locked(&self.state) = state;
    }

    /// Writes committed so far, in commit order.
    pub fn committed(&self) -> Vec<CompletedWrite> {
        locked(&self.committed).clone()
    }

    /// Writes aborted so far, in abort order.
    pub fn aborted(&self) -> Vec<CompletedWrite> {
        locked(&self.aborted).clone()
    }

    /// Number of committed writes.
    pub fn num_committed(&self) -> usize {
        locked(&self.committed).len()
    }

    /// Number of aborted writes.
    pub fn num_aborted(&self) -> usize {
        locked(&self.aborted).len()
    }
}

impl VBucketHandle for DurableStore {
    fn commit(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        _commit_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String> {
        locked(&self.committed).push(CompletedWrite {
            key: key.clone(),
            prepare_seqno,
            cookie,
        });
        debug!(%key, prepare_seqno, "committed sync write");
        self.notifier
            .sync_write_complete(cookie, SyncWriteOutcome::Committed);
        Ok(())
    }

    fn abort(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        _abort_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String> {
        locked(&self.aborted).push(CompletedWrite {
            key: key.clone(),
            prepare_seqno,
            cookie,
        });
        debug!(%key, prepare_seqno, "aborted sync write");
        self.notifier
            .sync_write_complete(cookie, SyncWriteOutcome::Aborted);
        Ok(())
    }

    fn persistence_seqno(&self) -> u64 {
        self.persistence_seqno.load(Ordering::SeqCst)
    }

    fn state(&self) -> VBucketState {
        *locked(&self.state)
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("durable store lock poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;

    #[test]
    fn test_commit_records_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = DurableStore::new(notifier.clone());

        store
            .commit(&StoredKey::from("k"), 5, None, 42)
            .unwrap();
        assert_eq!(store.num_committed(), 1);
        assert_eq!(store.committed()[0].prepare_seqno, 5);
        assert_eq!(
            notifier.completions(),
            vec![(42, SyncWriteOutcome::Committed)]
        );
    }

    #[test]
    fn test_abort_records_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = DurableStore::new(notifier.clone());

        store.abort(&StoredKey::from("k"), 5, None, 42).unwrap();
        assert_eq!(store.num_aborted(), 1);
        assert_eq!(
            notifier.completions(),
            vec![(42, SyncWriteOutcome::Aborted)]
        );
    }

    #[test]
    fn test_state_and_persistence_watermark() {
        let store = DurableStore::new(Arc::new(RecordingNotifier::new()));
        assert_eq!(store.state(), VBucketState::Active);
        assert_eq!(store.persistence_seqno(), 0);

        store.set_state(VBucketState::Replica);
        store.set_persistence_seqno(9);
        assert_eq!(store.state(), VBucketState::Replica);
        assert_eq!(store.persistence_seqno(), 9);
    }
}
