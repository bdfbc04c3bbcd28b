//! The failover table proper.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::Rng;
use tracing::{debug, warn};

use crate::entry::FailoverEntry;
use crate::error::FailoverError;
use crate::metrics::FailoverTableStats;
use crate::rollback::{adjust_snapshot_range, RollbackDecision, RollbackRequest};

/// Capacity policy for a failover table.
#[derive(Debug, Clone, Copy)]
pub struct FailoverTableConfig {
    /// Maximum number of entries kept. The oldest entries are dropped
    /// once the table grows past this.
    pub max_entries: usize,
}

impl Default for FailoverTableConfig {
    fn default() -> Self {
        Self { max_entries: 25 }
    }
}

#[derive(Debug)]
struct Inner {
    /// Newest entry at the front. Nonempty outside of
    /// `remove_latest_entry`, whose caller must restore an entry.
    table: VecDeque<FailoverEntry>,
    /// Durable JSON form, recomputed under the lock on every mutation.
    cached_json: String,
    /// Entries dropped while sanitising damaged on-disk state.
    erroneous_entries_erased: u64,
}

/// Ordered log of a vBucket's history branches, newest at the front.
#[derive(Debug)]
pub struct FailoverTable {
    max_entries: usize,
    /// Mirror of the front entry's UUID, readable without the lock.
    latest_uuid: AtomicU64,
    inner: Mutex<Inner>,
}

impl FailoverTable {
    /// Create a table with a single synthetic entry at seqno 0.
    pub fn new(config: FailoverTableConfig) -> Self {
        let table = Self {
            max_entries: config.max_entries,
            latest_uuid: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                table: VecDeque::new(),
                cached_json: String::new(),
                erroneous_entries_erased: 0,
            }),
        };
        table.create_entry(0);
        table
    }

    /// Load a table from its durable JSON form, then sanitize it.
    ///
    /// `high_seqno` seeds the replacement entry if sanitisation empties
    /// the table. A document that fails to parse, or parses to an empty
    /// array, is rejected without constructing a table.
    pub fn from_json(
        json: &str,
        config: FailoverTableConfig,
        high_seqno: u64,
    ) -> Result<Self, FailoverError> {
        let entries: Vec<FailoverEntry> = serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "failed to parse failover table JSON");
            FailoverError::InvalidJson {
                reason: e.to_string(),
            }
        })?;
        if entries.is_empty() {
            return Err(FailoverError::InvalidJson {
                reason: "failover table must have at least one entry".to_string(),
            });
        }

        let latest = entries[0].vb_uuid;
        let table = Self {
            max_entries: config.max_entries,
            latest_uuid: AtomicU64::new(latest),
            inner: Mutex::new(Inner {
                table: entries.into(),
                cached_json: json.to_string(),
                erroneous_entries_erased: 0,
            }),
        };
        table.sanitize(high_seqno);
        Ok(table)
    }

    /// Start a new branch of history at `high_seqno`.
    ///
    /// Entries above `high_seqno` belong to a branch this vBucket has
    /// diverged from and are dropped first; they are not counted as
    /// erroneous.
    pub fn create_entry(&self, high_seqno: u64) {
        let mut inner = self.locked();
        self.create_entry_locked(&mut inner, high_seqno);
    }

    /// The newest entry, if the table is nonempty.
    pub fn latest_entry(&self) -> Option<FailoverEntry> {
        self.locked().table.front().copied()
    }

    /// UUID of the current branch, served from a lock-free mirror.
    pub fn latest_uuid(&self) -> u64 {
        self.latest_uuid.load(Ordering::Relaxed)
    }

    /// Pop the newest entry. The caller must re-establish nonemptiness
    /// (normally via `create_entry`) before the table is used again.
    pub fn remove_latest_entry(&self) {
        let mut inner = self.locked();
        if inner.table.pop_front().is_some() {
            Self::recache(&mut inner);
        }
    }

    /// Drop every entry with `by_seqno > seqno`.
    ///
    /// Rejects `seqno == 0` (the initial entry may never be pruned) and
    /// any prune that would empty the table.
    pub fn prune_entries(&self, seqno: u64) -> Result<(), FailoverError> {
        if seqno == 0 {
            return Err(FailoverError::PruneToZero);
        }
        let mut inner = self.locked();

        let surviving = inner.table.iter().filter(|e| e.by_seqno <= seqno).count();
        if surviving < 1 {
            return Err(FailoverError::PruneToEmpty { seqno });
        }

        inner.table.retain(|e| e.by_seqno <= seqno);
        let front_uuid = inner.table.front().map(|e| e.vb_uuid).unwrap_or(0);
        self.latest_uuid.store(front_uuid, Ordering::Relaxed);
        Self::recache(&mut inner);
        Ok(())
    }

    /// Replace the table from a packed buffer of 16-byte big-endian
    /// records. Buffer order equals table order, so the head of the new
    /// table is the buffer's first record and `to_wire` round-trips.
    pub fn replace_from_wire(&self, bytes: &[u8]) -> Result<(), FailoverError> {
        if bytes.is_empty() || bytes.len() % FailoverEntry::WIRE_SIZE != 0 {
            return Err(FailoverError::BadWireLength {
                length: bytes.len(),
            });
        }
        let mut replacement = VecDeque::with_capacity(bytes.len() / FailoverEntry::WIRE_SIZE);
        for chunk in bytes.chunks_exact(FailoverEntry::WIRE_SIZE) {
            let mut record = [0u8; FailoverEntry::WIRE_SIZE];
            record.copy_from_slice(chunk);
            replacement.push_back(FailoverEntry::from_wire(&record));
        }

        let mut inner = self.locked();
        inner.table = replacement;
        let front_uuid = inner.table.front().map(|e| e.vb_uuid).unwrap_or(0);
        self.latest_uuid.store(front_uuid, Ordering::Relaxed);
        Self::recache(&mut inner);
        debug!(entries = inner.table.len(), "replaced failover log from wire");
        Ok(())
    }

    /// Pack the table into wire records, newest first.
    pub fn to_wire(&self) -> Vec<u8> {
        let inner = self.locked();
        let mut buf = Vec::with_capacity(inner.table.len() * FailoverEntry::WIRE_SIZE);
        for entry in &inner.table {
            buf.extend_from_slice(&entry.to_wire());
        }
        buf
    }

    /// Snapshot of the entries, newest first.
    pub fn entries(&self) -> Vec<FailoverEntry> {
        self.locked().table.iter().copied().collect()
    }

    /// The seqno at which the branch identified by `uuid` ended.
    ///
    /// Returns `None` when `uuid` is the current branch (it has no end
    /// yet) or is unknown. Otherwise the result is the high seqno of the
    /// next-younger entry at the first match walking newest to oldest.
    pub fn last_seqno_for_uuid(&self, uuid: u64) -> Option<u64> {
        let inner = self.locked();
        if inner.table.front()?.vb_uuid == uuid {
            return None;
        }
        for idx in 1..inner.table.len() {
            if inner.table[idx].vb_uuid == uuid {
                return Some(inner.table[idx - 1].by_seqno);
            }
        }
        None
    }

    /// Decide whether a reconnecting consumer must roll back, and to
    /// which seqno.
    pub fn needs_rollback(&self, req: RollbackRequest) -> RollbackDecision {
        // Consumers with no history at all, or ones that do not insist
        // on a UUID match at seqno 0, can always start from scratch.
        if req.start_seqno == 0 && (!req.strict_vb_uuid_match || req.vb_uuid == 0) {
            return RollbackDecision::Resume;
        }

        let mut snap_start = req.snap_start_seqno;
        let mut snap_end = req.snap_end_seqno;
        adjust_snapshot_range(req.start_seqno, &mut snap_start, &mut snap_end);

        // A collection stream whose consumer already holds every
        // mutation for the streamed collections cannot have missed a
        // purged deletion, whatever the purge seqno says.
        let purge_exempt = req.max_collection_high_seqno.map_or(false, |max_ch| {
            req.start_seqno < req.purge_seqno
                && req.start_seqno >= max_ch
                && max_ch <= req.purge_seqno
        });

        if req.start_seqno < req.purge_seqno && req.start_seqno != 0 && !purge_exempt {
            return RollbackDecision::Rollback {
                rollback_seqno: 0,
                reason: format!(
                    "purge seqno ({}) is greater than start seqno - could miss purged deletions",
                    req.purge_seqno
                ),
            };
        }

        let inner = self.locked();

        // Search from the oldest entry. On a match, the next-younger
        // entry's seqno bounds the history shared with the consumer; a
        // match at the front shares everything up to the current seqno.
        let mut matched = None;
        for idx in (0..inner.table.len()).rev() {
            if inner.table[idx].vb_uuid == req.vb_uuid {
                matched = Some(idx);
                break;
            }
        }

        let idx = match matched {
            Some(idx) => idx,
            None => {
                return RollbackDecision::Rollback {
                    rollback_seqno: 0,
                    reason: "vBucket UUID not found in failover table, consumer and \
                             producer have no common history"
                        .to_string(),
                };
            }
        };

        let upper = if idx > 0 {
            inner.table[idx - 1].by_seqno
        } else {
            req.cur_seqno
        };

        if snap_end <= upper {
            return RollbackDecision::Resume;
        }

        // The consumer's snapshot runs past our shared history. Resume
        // from `upper` when the snapshot had not started by then, else
        // from the snapshot start to keep deduplication correct.
        let rollback_seqno = if upper < snap_start { upper } else { snap_start };
        RollbackDecision::Rollback {
            rollback_seqno,
            reason: format!("consumer ahead of producer - producer upper at {}", upper),
        }
    }

    /// Repair a table loaded from disk.
    ///
    /// Drops entries with a zero UUID and entries whose seqno exceeds
    /// that of the preceding (younger) surviving entry; both shapes have
    /// been observed in damaged legacy files. An emptied table gets a
    /// fresh entry at `high_seqno`.
    pub fn sanitize(&self, high_seqno: u64) {
        let mut inner = self.locked();
        let old = std::mem::take(&mut inner.table);
        let before = old.len();

        let mut kept: VecDeque<FailoverEntry> = VecDeque::with_capacity(before);
        for entry in old {
            if entry.vb_uuid == 0 {
                continue;
            }
            if let Some(prev) = kept.back() {
                if entry.by_seqno > prev.by_seqno {
                    continue;
                }
            }
            kept.push_back(entry);
        }

        let erased = (before - kept.len()) as u64;
        inner.table = kept;
        inner.erroneous_entries_erased += erased;
        if erased > 0 {
            warn!(erased, "erased erroneous failover table entries");
        }

        if inner.table.is_empty() {
            self.create_entry_locked(&mut inner, high_seqno);
        } else if erased > 0 {
            let front_uuid = inner.table.front().map(|e| e.vb_uuid).unwrap_or(0);
            self.latest_uuid.store(front_uuid, Ordering::Relaxed);
            Self::recache(&mut inner);
        }
    }

    /// The durable JSON form: an array of `{"id", "seq"}` objects,
    /// newest first (oldest entry last).
    pub fn to_json(&self) -> String {
        self.locked().cached_json.clone()
    }

    /// Number of entries currently in the table.
    pub fn num_entries(&self) -> usize {
        self.locked().table.len()
    }

    /// Number of entries dropped by sanitisation over this table's life.
    pub fn num_erroneous_entries_erased(&self) -> u64 {
        self.locked().erroneous_entries_erased
    }

    /// Observability snapshot.
    pub fn stats(&self) -> FailoverTableStats {
        let inner = self.locked();
        FailoverTableStats {
            num_entries: inner.table.len(),
            num_erroneous_entries_erased: inner.erroneous_entries_erased,
            entries: inner.table.iter().copied().collect(),
        }
    }

    fn create_entry_locked(&self, inner: &mut Inner, high_seqno: u64) {
        // The table describes only this vBucket's branch of history;
        // entries above the new branch point were diverged from and are
        // dropped (not counted as erroneous).
        inner.table.retain(|e| e.by_seqno <= high_seqno);

        let mut rng = rand::thread_rng();
        let vb_uuid = loop {
            // 48-bit space, top 16 bits clear for the legacy wire
            // format. Zero is reserved as "no branch".
            let candidate = rng.gen::<u64>() >> 16;
            if candidate != 0 {
                break candidate;
            }
        };

        inner.table.push_front(FailoverEntry { vb_uuid, by_seqno: high_seqno });
        self.latest_uuid.store(vb_uuid, Ordering::Relaxed);

        while inner.table.len() > self.max_entries {
            inner.table.pop_back();
        }
        debug!(vb_uuid, high_seqno, "created failover table entry");
        Self::recache(inner);
    }

    fn recache(inner: &mut Inner) {
        inner.cached_json = serde_json::to_string(&inner.table)
            .expect("failover table JSON serialisation cannot fail");
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned lock means a panic mid-mutation; the table
            // state can no longer be trusted.
            Err(_) => panic!("failover table lock poisoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(entries: &[(u64, u64)]) -> FailoverTable {
        let json = serde_json::to_string(
            &entries
                .iter()
                .map(|&(vb_uuid, by_seqno)| FailoverEntry { vb_uuid, by_seqno })
                .collect::<Vec<_>>(),
        )
        .unwrap();
        FailoverTable::from_json(&json, FailoverTableConfig::default(), 0).unwrap()
    }

    fn resume_req(start: u64, cur: u64, uuid: u64) -> RollbackRequest {
        RollbackRequest {
            start_seqno: start,
            cur_seqno: cur,
            vb_uuid: uuid,
            snap_start_seqno: start,
            snap_end_seqno: start,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        }
    }

    #[test]
    fn test_new_table_has_one_entry_at_zero() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        assert_eq!(table.num_entries(), 1);
        let entry = table.latest_entry().unwrap();
        assert_eq!(entry.by_seqno, 0);
        assert_ne!(entry.vb_uuid, 0);
        assert_eq!(table.latest_uuid(), entry.vb_uuid);
    }

    #[test]
    fn test_create_entry_pushes_front() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        let first = table.latest_uuid();
        table.create_entry(100);
        assert_eq!(table.num_entries(), 2);
        let entry = table.latest_entry().unwrap();
        assert_eq!(entry.by_seqno, 100);
        assert_ne!(entry.vb_uuid, first);
        assert_eq!(table.latest_uuid(), entry.vb_uuid);
    }

    #[test]
    fn test_create_entry_drops_diverged_branches() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        table.create_entry(100);
        table.create_entry(200);
        // Creating at 150 drops the entry at 200 before inserting.
        table.create_entry(150);
        let seqnos: Vec<u64> = table.entries().iter().map(|e| e.by_seqno).collect();
        assert_eq!(seqnos, vec![150, 100, 0]);
    }

    #[test]
    fn test_create_entry_caps_size() {
        let table = FailoverTable::new(FailoverTableConfig { max_entries: 3 });
        for seqno in 1..=10 {
            table.create_entry(seqno);
        }
        assert_eq!(table.num_entries(), 3);
        let seqnos: Vec<u64> = table.entries().iter().map(|e| e.by_seqno).collect();
        assert_eq!(seqnos, vec![10, 9, 8]);
    }

    #[test]
    fn test_seqnos_strictly_ordered_front_to_back() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        for seqno in [10, 20, 30, 40] {
            table.create_entry(seqno);
        }
        let entries = table.entries();
        for pair in entries.windows(2) {
            assert!(pair[0].by_seqno > pair[1].by_seqno);
        }
    }

    #[test]
    fn test_remove_latest_entry() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        table.create_entry(100);
        table.remove_latest_entry();
        assert_eq!(table.num_entries(), 1);
        assert_eq!(table.latest_entry().unwrap().by_seqno, 0);
        // Emptying entirely is permitted; the caller restores.
        table.remove_latest_entry();
        assert_eq!(table.num_entries(), 0);
        assert!(table.latest_entry().is_none());
        table.create_entry(0);
        assert_eq!(table.num_entries(), 1);
    }

    #[test]
    fn test_prune_entries_rejects_zero() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        assert!(matches!(
            table.prune_entries(0),
            Err(FailoverError::PruneToZero)
        ));
    }

    #[test]
    fn test_prune_entries_rejects_emptying() {
        let table = table_with(&[(7, 100), (3, 50)]);
        assert!(matches!(
            table.prune_entries(10),
            Err(FailoverError::PruneToEmpty { seqno: 10 })
        ));
        // Nothing was removed.
        assert_eq!(table.num_entries(), 2);
    }

    #[test]
    fn test_prune_entries_drops_newer() {
        let table = table_with(&[(9, 300), (7, 200), (3, 100)]);
        table.prune_entries(250).unwrap();
        let seqnos: Vec<u64> = table.entries().iter().map(|e| e.by_seqno).collect();
        assert_eq!(seqnos, vec![200, 100]);
        assert_eq!(table.latest_uuid(), 7);
    }

    #[test]
    fn test_wire_roundtrip() {
        let table = table_with(&[(9, 300), (7, 200), (3, 100)]);
        let wire = table.to_wire();
        assert_eq!(wire.len(), 48);

        let other = FailoverTable::new(FailoverTableConfig::default());
        other.replace_from_wire(&wire).unwrap();
        assert_eq!(other.entries(), table.entries());
        assert_eq!(other.latest_uuid(), 9);
    }

    #[test]
    fn test_replace_from_wire_rejects_bad_length() {
        let table = FailoverTable::new(FailoverTableConfig::default());
        assert!(matches!(
            table.replace_from_wire(&[]),
            Err(FailoverError::BadWireLength { length: 0 })
        ));
        assert!(matches!(
            table.replace_from_wire(&[0u8; 15]),
            Err(FailoverError::BadWireLength { length: 15 })
        ));
        assert!(matches!(
            table.replace_from_wire(&[0u8; 17]),
            Err(FailoverError::BadWireLength { length: 17 })
        ));
        // The failed calls left the table untouched.
        assert_eq!(table.num_entries(), 1);
    }

    #[test]
    fn test_json_roundtrip() {
        let table = table_with(&[(9, 300), (7, 200), (3, 100)]);
        let json = table.to_json();
        let loaded = FailoverTable::from_json(&json, FailoverTableConfig::default(), 300).unwrap();
        assert_eq!(loaded.entries(), table.entries());
        assert_eq!(loaded.to_json(), json);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        for bad in [
            "not json",
            "{}",
            "[]",
            r#"[{"id": 1}]"#,
            r#"[{"seq": 1}]"#,
            r#"[{"id": "x", "seq": 1}]"#,
            r#"[1, 2]"#,
        ] {
            assert!(
                FailoverTable::from_json(bad, FailoverTableConfig::default(), 0).is_err(),
                "accepted: {bad}"
            );
        }
    }

    #[test]
    fn test_sanitize_drops_zero_uuid() {
        let json = r#"[{"id":5,"seq":100},{"id":0,"seq":50},{"id":3,"seq":20}]"#;
        let table = FailoverTable::from_json(json, FailoverTableConfig::default(), 100).unwrap();
        let uuids: Vec<u64> = table.entries().iter().map(|e| e.vb_uuid).collect();
        assert_eq!(uuids, vec![5, 3]);
        assert_eq!(table.num_erroneous_entries_erased(), 1);
    }

    #[test]
    fn test_sanitize_drops_out_of_order_seqnos() {
        let json = r#"[{"id":5,"seq":100},{"id":4,"seq":200},{"id":3,"seq":20}]"#;
        let table = FailoverTable::from_json(json, FailoverTableConfig::default(), 100).unwrap();
        let uuids: Vec<u64> = table.entries().iter().map(|e| e.vb_uuid).collect();
        assert_eq!(uuids, vec![5, 3]);
        assert_eq!(table.num_erroneous_entries_erased(), 1);
    }

    #[test]
    fn test_sanitize_replaces_fully_erroneous_table() {
        let json = r#"[{"id":0,"seq":100},{"id":0,"seq":50}]"#;
        let table = FailoverTable::from_json(json, FailoverTableConfig::default(), 77).unwrap();
        assert_eq!(table.num_entries(), 1);
        let entry = table.latest_entry().unwrap();
        assert_eq!(entry.by_seqno, 77);
        assert_ne!(entry.vb_uuid, 0);
        assert_eq!(table.num_erroneous_entries_erased(), 2);
    }

    #[test]
    fn test_last_seqno_for_uuid() {
        let table = table_with(&[(9, 300), (7, 200), (3, 100)]);
        // Current branch has no end yet.
        assert_eq!(table.last_seqno_for_uuid(9), None);
        // Branch 7 ended where branch 9 began.
        assert_eq!(table.last_seqno_for_uuid(7), Some(300));
        assert_eq!(table.last_seqno_for_uuid(3), Some(200));
        assert_eq!(table.last_seqno_for_uuid(42), None);
    }

    #[test]
    fn test_rollback_start_zero_lenient() {
        let table = table_with(&[(9, 300)]);
        let mut req = resume_req(0, 300, 42);
        req.strict_vb_uuid_match = false;
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_rollback_start_zero_unknown_uuid() {
        let table = table_with(&[(9, 300)]);
        let req = resume_req(0, 300, 0);
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_rollback_start_zero_strict_mismatch() {
        let table = table_with(&[(9, 300)]);
        let req = resume_req(0, 300, 42);
        let decision = table.needs_rollback(req);
        assert_eq!(decision.rollback_seqno(), Some(0));
    }

    #[test]
    fn test_rollback_uuid_mismatch() {
        // Strict match at seqno 50 against a table that has never
        // seen UUID 42: no common history at all.
        let table = table_with(&[(99, 100)]);
        let req = resume_req(50, 100, 42);
        match table.needs_rollback(req) {
            RollbackDecision::Rollback {
                rollback_seqno,
                reason,
            } => {
                assert_eq!(rollback_seqno, 0);
                assert!(reason.contains("UUID not found"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[test]
    fn test_rollback_snap_start() {
        // Branch 3 was succeeded by branch 7 at seqno 100, so shared
        // history ends there. The consumer's snapshot [130, 180] runs
        // past it and had not started by 100, so it resumes from 100.
        let table = table_with(&[(7, 100), (3, 50)]);
        let req = RollbackRequest {
            start_seqno: 150,
            cur_seqno: 200,
            vb_uuid: 3,
            snap_start_seqno: 130,
            snap_end_seqno: 180,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        };
        match table.needs_rollback(req) {
            RollbackDecision::Rollback {
                rollback_seqno,
                reason,
            } => {
                assert_eq!(rollback_seqno, 100);
                assert!(reason.contains("producer upper at 100"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[test]
    fn test_rollback_to_snap_start_for_dedup() {
        // The snapshot straddles upper (90 < 100 < 180), so the
        // consumer must go back to the snapshot start.
        let table = table_with(&[(7, 100), (3, 50)]);
        let req = RollbackRequest {
            start_seqno: 150,
            cur_seqno: 200,
            vb_uuid: 3,
            snap_start_seqno: 90,
            snap_end_seqno: 180,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        };
        assert_eq!(table.needs_rollback(req).rollback_seqno(), Some(90));
    }

    #[test]
    fn test_no_rollback_on_current_branch() {
        let table = table_with(&[(7, 200), (3, 100)]);
        // Consumer on the current branch, fully inside shared history.
        let req = resume_req(150, 200, 7);
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_no_rollback_on_predecessor_branch_within_upper() {
        // The consumer sits on branch 3, which branch 7 succeeded at
        // 200; everything below 200 is shared, so a consumer at 150
        // resumes untouched.
        let table = table_with(&[(7, 200), (3, 100)]);
        let req = resume_req(150, 250, 3);
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_no_rollback_snapshot_normalisation() {
        // start == snap_start: the consumer holds none of snapshot
        // [80, 180], so snap_end collapses down to 80 and the consumer
        // resumes instead of rolling back to 80.
        let table = table_with(&[(7, 100), (3, 50)]);
        let req = RollbackRequest {
            start_seqno: 80,
            cur_seqno: 200,
            vb_uuid: 3,
            snap_start_seqno: 80,
            snap_end_seqno: 180,
            purge_seqno: 0,
            strict_vb_uuid_match: true,
            max_collection_high_seqno: None,
        };
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_rollback_purge_check() {
        let table = table_with(&[(7, 200)]);
        let mut req = resume_req(50, 200, 7);
        req.purge_seqno = 120;
        match table.needs_rollback(req) {
            RollbackDecision::Rollback {
                rollback_seqno,
                reason,
            } => {
                assert_eq!(rollback_seqno, 0);
                assert!(reason.contains("purge seqno (120)"), "reason: {reason}");
            }
            other => panic!("expected rollback, got {other:?}"),
        }
    }

    #[test]
    fn test_rollback_purge_exemption_for_collection_stream() {
        // The consumer holds everything for its collections (start >=
        // max collection high seqno <= purge), so the purge check is
        // skipped and the stream resumes.
        let table = table_with(&[(7, 200)]);
        let mut req = resume_req(50, 200, 7);
        req.purge_seqno = 120;
        req.max_collection_high_seqno = Some(40);
        assert_eq!(table.needs_rollback(req), RollbackDecision::Resume);
    }

    #[test]
    fn test_purge_exemption_not_granted_when_collection_ahead() {
        let table = table_with(&[(7, 200)]);
        let mut req = resume_req(50, 200, 7);
        req.purge_seqno = 120;
        // Streamed collections have mutations past the consumer's
        // position, no exemption.
        req.max_collection_high_seqno = Some(60);
        assert!(table.needs_rollback(req).is_rollback());
    }

    #[test]
    fn test_stats_snapshot() {
        let table = table_with(&[(9, 300), (7, 200)]);
        let stats = table.stats();
        assert_eq!(stats.num_entries, 2);
        assert_eq!(stats.num_erroneous_entries_erased, 0);
        assert_eq!(stats.entries[0].vb_uuid, 9);
    }
}
