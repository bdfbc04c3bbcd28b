//! The vBucket facade.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::error::VBucketError;
use crate::notify::ClientNotifier;
use crate::seqno::SeqnoGenerator;
use crate::store::DurableStore;
use tidekv_collections::Manifest;
use tidekv_durability::{
    ActiveDurabilityMonitor, Cookie, DurabilityMonitorStats, DurabilityRequirements, MonitorConfig,
    QueuedItem, StoredKey, VBucketState,
};
use tidekv_failover::{
    FailoverTable, FailoverTableConfig, FailoverTableStats, RollbackDecision, RollbackRequest,
};

/// Configuration for one vBucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct VBucketConfig {
    /// Failover table capacity policy.
    pub failover: FailoverTableConfig,
    /// Durability monitor sizing.
    pub monitor: MonitorConfig,
}

/// Aggregated observability snapshot of one vBucket.
#[derive(Debug, Clone)]
pub struct VBucketStats {
    /// The vBucket's replication role.
    pub state: VBucketState,
    /// The last assigned seqno.
    pub high_seqno: u64,
    /// The installed manifest's version.
    pub manifest_uid: u64,
    /// Durability monitor snapshot.
    pub durability: DurabilityMonitorStats,
    /// Failover table snapshot.
    pub failover: FailoverTableStats,
}

/// One shard of the keyspace: the durability monitor, failover table
/// and manifest view behind a single facade.
pub struct VBucket {
    store: Arc<DurableStore>,
    seqnos: SeqnoGenerator,
    monitor: ActiveDurabilityMonitor<Arc<DurableStore>>,
    failover: FailoverTable,
    manifest: RwLock<Arc<Manifest>>,
}

impl VBucket {
    /// Create an active vBucket starting at the epoch manifest with a
    /// fresh failover history.
    pub fn new(config: VBucketConfig, notifier: Arc<dyn ClientNotifier>) -> Self {
        let store = Arc::new(DurableStore::new(notifier));
        let monitor = ActiveDurabilityMonitor::new(store.clone(), config.monitor);
        Self {
            store,
            seqnos: SeqnoGenerator::new(),
            monitor,
            failover: FailoverTable::new(config.failover),
            manifest: RwLock::new(Arc::new(Manifest::epoch())),
        }
    }

    /// Stamp a durable mutation with the next seqno and hand it to the
    /// durability monitor. Returns the assigned seqno.
    pub fn queue_sync_write(
        &self,
        cookie: Cookie,
        key: StoredKey,
        reqs: DurabilityRequirements,
    ) -> Result<u64, VBucketError> {
        let by_seqno = self.seqnos.next();
        self.monitor
            .add_sync_write(cookie, QueuedItem { key, by_seqno, reqs })?;
        Ok(by_seqno)
    }

    /// Feed a replica's seqno ack into the monitor.
    pub fn seqno_ack(&self, node: &str, prepared_seqno: u64) -> Result<(), VBucketError> {
        self.monitor.seqno_ack_received(node, prepared_seqno)?;
        Ok(())
    }

    /// Record a flusher notification: everything up to `persisted` is
    /// on disk locally, which may complete pending writes.
    pub fn notify_persistence(&self, persisted: u64) -> Result<(), VBucketError> {
        self.store.set_persistence_seqno(persisted);
        self.monitor.notify_local_persistence()?;
        Ok(())
    }

    /// The periodic timeout task body: abort expired durable writes.
    pub fn sweep_timeouts(&self, as_of: Instant) -> Result<(), VBucketError> {
        self.monitor.process_timeout(as_of)?;
        Ok(())
    }

    /// Install a replication topology.
    pub fn set_topology(&self, topology: &Value) -> Result<(), VBucketError> {
        self.monitor.set_replication_topology(topology)?;
        Ok(())
    }

    /// Promote this vBucket to active, starting a new branch of
    /// history at the current high seqno.
    pub fn promote(&self) {
        self.store.set_state(VBucketState::Active);
        let high_seqno = self.seqnos.high_seqno();
        debug!(high_seqno, "promoting vbucket to active");
        self.failover.create_entry(high_seqno);
    }

    /// Change the replication role without touching failover history.
    pub fn set_state(&self, state: VBucketState) {
        self.store.set_state(state);
    }

    /// The vBucket's replication role.
    pub fn state(&self) -> VBucketState {
        use tidekv_durability::VBucketHandle;
        self.store.state()
    }

    /// Arbitrate a stream reconnect against the failover history.
    pub fn stream_request(&self, req: RollbackRequest) -> RollbackDecision {
        self.failover.needs_rollback(req)
    }

    /// Replace the manifest, enforcing the successor rules.
    pub fn update_manifest(&self, candidate: Manifest) -> Result<(), VBucketError> {
        let mut current = match self.manifest.write() {
            Ok(guard) => guard,
            Err(_) => panic!("manifest lock poisoned"),
        };
        current.is_successor(&candidate)?;
        debug!(uid = %candidate.uid(), "installing collections manifest");
        *current = Arc::new(candidate);
        Ok(())
    }

    /// The installed manifest (copy-on-write handle).
    pub fn manifest(&self) -> Arc<Manifest> {
        match self.manifest.read() {
            Ok(guard) => guard.clone(),
            Err(_) => panic!("manifest lock poisoned"),
        }
    }

    /// The last assigned seqno.
    pub fn high_seqno(&self) -> u64 {
        self.seqnos.high_seqno()
    }

    /// The durability monitor.
    pub fn monitor(&self) -> &ActiveDurabilityMonitor<Arc<DurableStore>> {
        &self.monitor
    }

    /// The failover table.
    pub fn failover_table(&self) -> &FailoverTable {
        &self.failover
    }

    /// The committed/aborted ledgers.
    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    /// Aggregated observability snapshot.
    pub fn stats(&self) -> VBucketStats {
        VBucketStats {
            state: self.state(),
            high_seqno: self.seqnos.high_seqno(),
            manifest_uid: self.manifest().stats().uid,
            durability: self.monitor.stats(),
            failover: self.failover.stats(),
        }
    }
}
