//! Property-based tests for the durability monitor, driven through the
//! vBucket facade.

use proptest::prelude::*;

/// One step of a randomised durable-write workload against a
/// three-node chain `[a, r1, r2]`.
#[derive(Debug, Clone)]
pub enum MonitorOp {
    /// Queue a durable write; the index selects the level.
    Write {
        /// 0 = Majority, 1 = MajorityAndPersistOnMaster,
        /// 2 = PersistToMajority.
        level_idx: u8,
    },
    /// Advance one replica's acked seqno.
    Ack {
        /// 0 = r1, 1 = r2.
        node_idx: u8,
        /// How far past its previous ack the replica reports.
        advance: u8,
    },
    /// Advance the local persistence watermark and notify the monitor.
    Persist {
        /// How far the flusher got since last time.
        advance: u8,
    },
}

/// Generator for workload steps.
pub fn arb_monitor_op() -> impl Strategy<Value = MonitorOp> {
    prop_oneof![
        (0u8..3).prop_map(|level_idx| MonitorOp::Write { level_idx }),
        (0u8..2, 0u8..4).prop_map(|(node_idx, advance)| MonitorOp::Ack { node_idx, advance }),
        (0u8..4).prop_map(|advance| MonitorOp::Persist { advance }),
    ]
}
