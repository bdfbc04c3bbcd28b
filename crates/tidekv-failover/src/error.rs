//! Error types for the failover table.

use thiserror::Error;

/// Errors that can occur operating on a failover table.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// A packed failover log had an invalid length.
    #[error("failover log length (which is {length}) must be a non-zero multiple of 16")]
    BadWireLength {
        /// The rejected buffer length in bytes.
        length: usize,
    },

    /// Pruning up to seqno zero would remove the initial entry.
    #[error("cannot prune entry zero")]
    PruneToZero,

    /// Pruning would leave the table empty.
    #[error("cannot prune up to seqno {seqno} as it would result in less than one element in failover table")]
    PruneToEmpty {
        /// The requested prune seqno.
        seqno: u64,
    },

    /// The durable JSON form could not be loaded.
    #[error("unable to load failover table from JSON: {reason}")]
    InvalidJson {
        /// What was wrong with the document.
        reason: String,
    },
}
