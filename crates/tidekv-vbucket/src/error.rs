//! Error type for the vBucket facade.

use thiserror::Error;
use tidekv_collections::ManifestError;
use tidekv_durability::DurabilityError;
use tidekv_failover::FailoverError;

/// Errors surfaced by vBucket operations, wrapping the owning
/// subsystem's error.
#[derive(Debug, Error)]
pub enum VBucketError {
    /// The durability monitor rejected the operation.
    #[error("durability: {0}")]
    Durability(#[from] DurabilityError),

    /// The failover table rejected the operation.
    #[error("failover: {0}")]
    Failover(#[from] FailoverError),

    /// The manifest was malformed or not a successor.
    #[error("collections: {0}")]
    Manifest(#[from] ManifestError),
}
