//! Error types for the durability monitor.

use crate::types::VBucketState;
use thiserror::Error;

/// Recoverable errors surfaced by the durability monitor.
///
/// Invariant violations (duplicate acks, monotonic regressions, cursor
/// corruption, failed commit/abort callbacks) are not represented here;
/// they are unrecoverable and panic instead.
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// The replication topology document was malformed.
    #[error("replication topology is invalid: {reason}")]
    InvalidTopology {
        /// What was wrong with the document.
        reason: String,
    },

    /// A SyncWrite was submitted with durability level None.
    #[error("durability level None is not allowed for a SyncWrite")]
    LevelNone,

    /// The current chain cannot satisfy any durability requirement.
    #[error("durability requirements cannot be met by the current replication topology")]
    DurabilityImpossible,

    /// No replication topology has been installed yet.
    #[error("no replication chain has been set")]
    NoTopology,

    /// A seqno ack arrived from a node outside the chain.
    #[error("node {node} is not a member of the first replication chain")]
    UnknownNode {
        /// The unknown node id.
        node: String,
    },

    /// The operation requires an active vBucket.
    #[error("operation requires an active vbucket, state is {state:?}")]
    NotActive {
        /// The vBucket's actual state.
        state: VBucketState,
    },
}
