//! Observability snapshot for the durability monitor.

use crate::types::VBucketState;

/// Seqno tracking state of one chain node, both tracking streams.
#[derive(Debug, Clone)]
pub struct NodePositionStats {
    /// The node id.
    pub node: String,
    /// Seqno of the last tracked write the node's memory cursor
    /// acknowledged.
    pub memory_last_write_seqno: u64,
    /// The raw memory seqno the node last reported.
    pub memory_last_ack_seqno: u64,
    /// Seqno of the last tracked write the node's disk cursor
    /// acknowledged.
    pub disk_last_write_seqno: u64,
    /// The raw disk seqno the node last reported.
    pub disk_last_ack_seqno: u64,
}

/// Point-in-time view of a durability monitor, as exposed on the stats
/// surface.
#[derive(Debug, Clone)]
pub struct DurabilityMonitorStats {
    /// The owning vBucket's state.
    pub state: VBucketState,
    /// Number of in-flight SyncWrites.
    pub num_tracked: usize,
    /// Highest contiguously disk-majority-acked seqno.
    pub high_prepared_seqno: u64,
    /// Seqno of the last SyncWrite added for tracking.
    pub last_tracked_seqno: u64,
    /// Defined nodes in the first chain.
    pub first_chain_size: usize,
    /// The first chain's majority.
    pub first_chain_majority: u8,
    /// Per-node cursor state, sorted by node id.
    pub nodes: Vec<NodePositionStats>,
}
