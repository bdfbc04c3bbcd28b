//! Rollback arbitration for reconnecting stream consumers.

/// A consumer's stream-resume request, as presented to the producer.
#[derive(Debug, Clone, Copy)]
pub struct RollbackRequest {
    /// Seqno the consumer wants to resume from.
    pub start_seqno: u64,
    /// The producer's current high seqno.
    pub cur_seqno: u64,
    /// The branch UUID the consumer last knew.
    pub vb_uuid: u64,
    /// Start of the consumer's last received snapshot.
    pub snap_start_seqno: u64,
    /// End of the consumer's last received snapshot.
    pub snap_end_seqno: u64,
    /// The producer's purge seqno (highest seqno dropped by compaction).
    pub purge_seqno: u64,
    /// Whether a `start_seqno == 0` request must still match on UUID.
    pub strict_vb_uuid_match: bool,
    /// For collection streams, the highest seqno of any streamed
    /// collection. Grants a purge-check exemption when the consumer
    /// already holds every mutation for those collections.
    pub max_collection_high_seqno: Option<u64>,
}

/// The outcome of rollback arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackDecision {
    /// The consumer may resume from its requested position.
    Resume,
    /// The consumer must roll back to `rollback_seqno` before resuming.
    Rollback {
        /// The seqno to roll back to.
        rollback_seqno: u64,
        /// Human-readable reason, surfaced to the consumer.
        reason: String,
    },
}

impl RollbackDecision {
    /// True if a rollback is required.
    pub fn is_rollback(&self) -> bool {
        matches!(self, RollbackDecision::Rollback { .. })
    }

    /// The rollback seqno, if a rollback is required.
    pub fn rollback_seqno(&self) -> Option<u64> {
        match self {
            RollbackDecision::Resume => None,
            RollbackDecision::Rollback {
                rollback_seqno, ..
            } => Some(*rollback_seqno),
        }
    }
}

/// Normalise the snapshot range against the resume point.
///
/// A consumer exactly at its snapshot end holds the whole snapshot; one
/// exactly at the snapshot start holds none of it. Collapsing the range
/// in those cases avoids rolling back a consumer that is not actually
/// mid-snapshot.
pub(crate) fn adjust_snapshot_range(
    start_seqno: u64,
    snap_start_seqno: &mut u64,
    snap_end_seqno: &mut u64,
) {
    if start_seqno == *snap_end_seqno {
        *snap_start_seqno = start_seqno;
    } else if start_seqno == *snap_start_seqno {
        *snap_end_seqno = start_seqno;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_consumer_has_whole_snapshot() {
        let mut snap_start = 10;
        let mut snap_end = 20;
        adjust_snapshot_range(20, &mut snap_start, &mut snap_end);
        assert_eq!(snap_start, 20);
        assert_eq!(snap_end, 20);
    }

    #[test]
    fn test_adjust_consumer_has_no_snapshot() {
        let mut snap_start = 10;
        let mut snap_end = 20;
        adjust_snapshot_range(10, &mut snap_start, &mut snap_end);
        assert_eq!(snap_start, 10);
        assert_eq!(snap_end, 10);
    }

    #[test]
    fn test_adjust_mid_snapshot_untouched() {
        let mut snap_start = 10;
        let mut snap_end = 20;
        adjust_snapshot_range(15, &mut snap_start, &mut snap_end);
        assert_eq!(snap_start, 10);
        assert_eq!(snap_end, 20);
    }
}
