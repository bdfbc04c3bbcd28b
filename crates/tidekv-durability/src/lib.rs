#![warn(missing_docs)]

//! TideKV active durability monitor.
//!
//! The monitor drives the finalisation (commit or abort) of durable
//! writes on an active vBucket. Each pending SyncWrite is tracked with
//! the acknowledgements received from every node of the replication
//! chain, split into memory and disk tracking; once a write's
//! durability level is satisfied it is committed back into the vBucket,
//! strictly in seqno order. Expired writes are aborted by a periodic
//! timeout sweep.
//!
//! All state sits behind a single lock. Operations that can complete
//! writes collect them under the lock and invoke the vBucket callbacks
//! only after releasing it, which keeps the monitor out of the
//! vBucket's own locking.

pub mod error;
pub mod metrics;
pub mod monitor;
pub mod monotonic;
pub mod types;

mod chain;
mod sync_write;
mod tracked;

pub use error::DurabilityError;
pub use metrics::{DurabilityMonitorStats, NodePositionStats};
pub use monitor::{ActiveDurabilityMonitor, MonitorConfig, NodeSeqnos};
pub use monotonic::{Monotonic, WeaklyMonotonic};
pub use types::{
    Cookie, DurabilityLevel, DurabilityRequirements, QueuedItem, StoredKey, Tracking,
    VBucketHandle, VBucketState,
};
