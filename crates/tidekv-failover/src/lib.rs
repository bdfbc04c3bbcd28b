#![warn(missing_docs)]

//! TideKV failover table: per-vBucket branch-of-history tracking.
//!
//! Every vBucket carries an ordered log of (branch UUID, high seqno)
//! entries, newest at the front. A new entry is pushed whenever the
//! vBucket's history forks (promotion after a node failure). Streaming
//! consumers present their last known (UUID, seqno) position on
//! reconnect and the table arbitrates whether they must roll back, and
//! to which seqno, before resuming.

pub mod entry;
pub mod error;
pub mod metrics;
pub mod rollback;
pub mod table;

pub use entry::FailoverEntry;
pub use error::FailoverError;
pub use metrics::FailoverTableStats;
pub use rollback::{RollbackDecision, RollbackRequest};
pub use table::{FailoverTable, FailoverTableConfig};
