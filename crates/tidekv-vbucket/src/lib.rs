#![warn(missing_docs)]

//! TideKV vBucket facade.
//!
//! Wires the durability monitor, the failover table and the collections
//! manifest into one per-shard unit: mutations are stamped with seqnos,
//! durable writes flow into the monitor, replica acks and local
//! persistence drive commits, clients are woken through the notifier,
//! stream reconnects consult the failover table, and manifest
//! replacement is gated by the successor check.

pub mod error;
pub mod notify;
pub mod seqno;
pub mod store;
pub mod vbucket;

pub use error::VBucketError;
pub use notify::{ClientNotifier, RecordingNotifier, SyncWriteOutcome};
pub use seqno::SeqnoGenerator;
pub use store::{CompletedWrite, DurableStore};
pub use vbucket::{VBucket, VBucketConfig, VBucketStats};
