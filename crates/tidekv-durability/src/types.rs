//! Shared types and the vBucket collaboration seam.

use std::fmt;

/// Opaque client token attached to a SyncWrite; handed back through the
/// commit/abort callbacks so the owning connection can be woken.
pub type Cookie = u64;

/// A document key as tracked by the monitor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StoredKey(Vec<u8>);

impl StoredKey {
    /// Create a key from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        StoredKey(bytes.into())
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoredKey({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for StoredKey {
    fn from(s: &str) -> Self {
        StoredKey(s.as_bytes().to_vec())
    }
}

/// Durability level requested for a SyncWrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityLevel {
    /// Not a durable write; rejected by the monitor.
    None,
    /// A majority of chain nodes hold the prepare in memory.
    Majority,
    /// Majority in memory, and the active has persisted it.
    MajorityAndPersistOnMaster,
    /// A majority of chain nodes have persisted the prepare.
    PersistToMajority,
}

/// The durability requirements carried by a SyncWrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilityRequirements {
    /// Requested level.
    pub level: DurabilityLevel,
    /// Optional timeout in milliseconds from enqueue time; an expired
    /// write is aborted by the timeout sweep.
    pub timeout_ms: Option<u64>,
}

impl DurabilityRequirements {
    /// Requirements at the given level with no timeout.
    pub fn level(level: DurabilityLevel) -> Self {
        Self {
            level,
            timeout_ms: None,
        }
    }
}

/// Which acknowledgement stream a cursor follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// The prepare is held in memory on the node.
    Memory,
    /// The prepare is persisted on the node.
    Disk,
}

impl fmt::Display for Tracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracking::Memory => write!(f, "memory"),
            Tracking::Disk => write!(f, "disk"),
        }
    }
}

/// Replication role of the vBucket owning a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VBucketState {
    /// Serves reads and writes; runs the active durability monitor.
    Active,
    /// Receives a replication stream from the active.
    Replica,
    /// Mid-transfer during rebalance.
    Pending,
    /// Not in service.
    Dead,
}

/// The mutation handed to the monitor for tracking: key, assigned
/// seqno and durability requirements.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    /// The document key.
    pub key: StoredKey,
    /// The seqno stamped on this mutation, strictly greater than every
    /// previously tracked seqno.
    pub by_seqno: u64,
    /// The write's durability requirements.
    pub reqs: DurabilityRequirements,
}

/// The slice of vBucket behavior the monitor drives.
///
/// `commit` and `abort` must succeed; a failure return is a logic error
/// and the monitor treats it as fatal. Both are invoked with the
/// monitor's state lock released.
pub trait VBucketHandle {
    /// Commit a satisfied prepare. `commit_seqno` is `None` when the
    /// commit is to be stamped by the vBucket itself.
    fn commit(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        commit_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String>;

    /// Abort a timed-out prepare. `abort_seqno` mirrors `commit_seqno`.
    fn abort(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        abort_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String>;

    /// The highest seqno the vBucket has persisted locally.
    fn persistence_seqno(&self) -> u64;

    /// The vBucket's current replication role.
    fn state(&self) -> VBucketState;
}

impl<T: VBucketHandle> VBucketHandle for std::sync::Arc<T> {
    fn commit(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        commit_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String> {
        (**self).commit(key, prepare_seqno, commit_seqno, cookie)
    }

    fn abort(
        &self,
        key: &StoredKey,
        prepare_seqno: u64,
        abort_seqno: Option<u64>,
        cookie: Cookie,
    ) -> Result<(), String> {
        (**self).abort(key, prepare_seqno, abort_seqno, cookie)
    }

    fn persistence_seqno(&self) -> u64 {
        (**self).persistence_seqno()
    }

    fn state(&self) -> VBucketState {
        (**self).state()
    }
}
