//! End-to-end scenario harness over the vBucket facade.

use std::sync::Arc;

use serde_json::json;
use tidekv_durability::{DurabilityLevel, DurabilityRequirements, StoredKey};
use tidekv_vbucket::{RecordingNotifier, VBucket, VBucketConfig};

/// A vBucket wired to a recording notifier, for driving full
/// durable-write flows the way the front end would.
pub struct TestVBucket {
    /// The vBucket under test.
    pub vb: VBucket,
    /// Captures client completions in notification order.
    pub notifier: Arc<RecordingNotifier>,
}

impl TestVBucket {
    /// An active vBucket with the chain `[active, replicas...]`.
    pub fn with_chain(nodes: &[&str]) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let vb = VBucket::new(VBucketConfig::default(), notifier.clone());
        vb.set_topology(&json!([nodes])).expect("valid chain");
        Self { vb, notifier }
    }

    /// Queue a durable write at `level` with no timeout; returns the
    /// assigned seqno. The cookie doubles as the client id.
    pub fn write(&self, cookie: u64, key: &str, level: DurabilityLevel) -> u64 {
        self.vb
            .queue_sync_write(
                cookie,
                StoredKey::from(key),
                DurabilityRequirements::level(level),
            )
            .expect("write accepted")
    }

    /// Seqnos committed so far, in commit order.
    pub fn committed_seqnos(&self) -> Vec<u64> {
        self.vb
            .store()
            .committed()
            .iter()
            .map(|w| w.prepare_seqno)
            .collect()
    }

    /// Seqnos aborted so far, in abort order.
    pub fn aborted_seqnos(&self) -> Vec<u64> {
        self.vb
            .store()
            .aborted()
            .iter()
            .map(|w| w.prepare_seqno)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tidekv_collections::Manifest;
    use tidekv_durability::DurabilityLevel;
    use tidekv_failover::{RollbackDecision, RollbackRequest};
    use tidekv_vbucket::SyncWriteOutcome;

    #[test]
    fn test_mixed_levels_lifecycle() {
        let t = TestVBucket::with_chain(&["a", "r1", "r2"]);

        let s1 = t.write(1, "m", DurabilityLevel::Majority);
        let s2 = t.write(2, "pm", DurabilityLevel::MajorityAndPersistOnMaster);
        let s3 = t.write(3, "p", DurabilityLevel::PersistToMajority);

        // One replica ack: only the plain Majority write completes.
        t.vb.seqno_ack("r1", s3).unwrap();
        assert_eq!(t.committed_seqnos(), vec![s1]);

        // Local persistence covers the active's disk ack for s2 and
        // one of the two disk acks s3 needs.
        t.vb.notify_persistence(s3).unwrap();
        assert_eq!(t.committed_seqnos(), vec![s1, s2]);

        // The second replica's ack provides s3's disk majority.
        t.vb.seqno_ack("r2", s3).unwrap();
        assert_eq!(t.committed_seqnos(), vec![s1, s2, s3]);
        assert_eq!(t.vb.monitor().num_tracked(), 0);

        // Clients were notified in commit order.
        let completions = t.notifier.completions();
        assert_eq!(
            completions,
            vec![
                (1, SyncWriteOutcome::Committed),
                (2, SyncWriteOutcome::Committed),
                (3, SyncWriteOutcome::Committed),
            ]
        );
    }

    #[test]
    fn test_timeout_and_commit_interleaved() {
        let t = TestVBucket::with_chain(&["a", "r1", "r2"]);

        let s1 = t.write(1, "kept", DurabilityLevel::Majority);
        let s2 = t
            .vb
            .queue_sync_write(
                2,
                StoredKey::from("expiring"),
                tidekv_durability::DurabilityRequirements {
                    level: DurabilityLevel::PersistToMajority,
                    timeout_ms: Some(10),
                },
            )
            .unwrap();

        t.vb.seqno_ack("r1", s1).unwrap();
        t.vb.sweep_timeouts(Instant::now() + Duration::from_millis(20))
            .unwrap();

        assert_eq!(t.committed_seqnos(), vec![s1]);
        assert_eq!(t.aborted_seqnos(), vec![s2]);
        assert_eq!(t.vb.monitor().num_tracked(), 0);
    }

    #[test]
    fn test_promotion_creates_rollback_point() {
        let t = TestVBucket::with_chain(&["a", "r1"]);
        let old_uuid = t.vb.failover_table().latest_uuid();

        for cookie in 1..=3 {
            let seqno = t.write(cookie, "doc", DurabilityLevel::Majority);
            t.vb.seqno_ack("r1", seqno).unwrap();
        }
        t.vb.promote();
        let new_uuid = t.vb.failover_table().latest_uuid();
        assert_ne!(new_uuid, old_uuid);

        // A consumer still on the old branch, ahead of the branch
        // point, must roll back to it.
        let decision = t.vb.stream_request(RollbackRequest {
            start_seqno: 5,
            cur_seqno: t.vb.high_seqno(),
            vb_uuid: old_uuid,
            snap_start_seqno: 5,
            snap_end_seqno: 5,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        });
        match decision {
            RollbackDecision::Rollback { rollback_seqno, .. } => {
                assert_eq!(rollback_seqno, 3)
            }
            RollbackDecision::Resume => panic!("expected rollback"),
        }

        // A consumer on the new branch resumes.
        let decision = t.vb.stream_request(RollbackRequest {
            start_seqno: 3,
            cur_seqno: t.vb.high_seqno(),
            vb_uuid: new_uuid,
            snap_start_seqno: 3,
            snap_end_seqno: 3,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        });
        assert_eq!(decision, RollbackDecision::Resume);
    }

    #[test]
    fn test_manifest_evolution_alongside_writes() {
        let t = TestVBucket::with_chain(&["a", "r1"]);

        let next = Manifest::parse(
            r#"{"uid": "a", "scopes": [
                {"uid": "0", "name": "_default",
                 "collections": [{"uid": "0", "name": "_default"},
                                 {"uid": "9", "name": "events"}]}
            ]}"#,
        )
        .unwrap();
        t.vb.update_manifest(next).unwrap();

        let seqno = t.write(1, "doc", DurabilityLevel::Majority);
        t.vb.seqno_ack("r1", seqno).unwrap();
        assert_eq!(t.committed_seqnos(), vec![seqno]);

        let stats = t.vb.stats();
        assert_eq!(stats.manifest_uid, 0xa);
        assert_eq!(stats.high_seqno, seqno);
    }
}
