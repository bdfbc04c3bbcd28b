//! The active durability monitor.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::chain::ReplicationChain;
use crate::error::DurabilityError;
use crate::metrics::{DurabilityMonitorStats, NodePositionStats};
use crate::monotonic::{Monotonic, WeaklyMonotonic};
use crate::sync_write::SyncWrite;
use crate::tracked::{TrackedWrites, WriteHandle};
use crate::types::{Cookie, DurabilityLevel, QueuedItem, Tracking, VBucketHandle, VBucketState};

/// Sizing knobs for a durability monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Most replicas a chain may carry (chain length is capped at
    /// `1 + max_replicas`).
    pub max_replicas: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { max_replicas: 3 }
    }
}

/// The (memory, disk) seqno pair tracked for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSeqnos {
    /// Memory-tracking seqno.
    pub memory: u64,
    /// Disk-tracking seqno.
    pub disk: u64,
}

/// Drives commit/abort of durable writes on an active vBucket.
///
/// One exclusive lock guards the whole state. Operations that complete
/// writes collect them under the lock and call back into the vBucket
/// only after releasing it; the vBucket callbacks take their own locks
/// and must never nest inside ours.
pub struct ActiveDurabilityMonitor<V: VBucketHandle> {
    vb: V,
    max_replicas: usize,
    state: RwLock<State>,
}

struct State {
    /// In-flight SyncWrites, seqnos strictly increasing head to tail.
    tracked: TrackedWrites,
    first_chain: Option<ReplicationChain>,
    /// Accepted but not yet enforced; kept for the future two-chain
    /// failover contract.
    second_chain: Option<Vec<Option<String>>>,
    /// Seqno of the last write added for tracking. Survives the
    /// container being emptied by commit/abort.
    last_tracked_seqno: Monotonic<u64>,
    /// Highest seqno whose tracked prefix is all disk-majority-acked.
    high_prepared_seqno: WeaklyMonotonic<u64>,
}

impl State {
    fn position_it(&self, node: &str, tracking: Tracking) -> Option<WriteHandle> {
        match self.first_chain.as_ref().and_then(|c| c.position(node)) {
            Some(pos) => pos.tracking(tracking).it,
            None => panic!("no position tracked for node {node}"),
        }
    }

    /// The element the node's cursor would advance onto next.
    fn node_next(&self, node: &str, tracking: Tracking) -> Option<WriteHandle> {
        self.tracked.next(self.position_it(node, tracking))
    }

    /// Advance the node's cursor one element and record the ack there.
    fn advance_node_position(&mut self, node: &str, tracking: Tracking) {
        let handle = match self.node_next(node, tracking) {
            Some(handle) => handle,
            None => panic!("cursor for node {node} cannot advance past the tracked container"),
        };
        let seqno = self.tracked.get(handle).by_seqno();
        {
            let pos = match self.first_chain.as_mut().and_then(|c| c.position_mut(node)) {
                Some(pos) => pos.tracking_mut(tracking),
                None => panic!("no position tracked for node {node}"),
            };
            pos.it = Some(handle);
            // Keeps the node's seqno state for when the pointed write
            // is removed from the container.
            pos.last_write_seqno.set(seqno);
        }
        self.tracked.get_mut(handle).ack(node, tracking);

        if tracking == Tracking::Disk {
            // Per-node disk acks apply in seqno order, so the first
            // write to cross its majority has every earlier tracked
            // write already across: its seqno is durably prepared.
            let write = self.tracked.get(handle);
            if write.disk_ack_count() == write.majority() {
                self.high_prepared_seqno.set(seqno);
            }
        }
    }

    /// Record the raw seqno the node reported.
    fn update_node_ack(&mut self, node: &str, tracking: Tracking, seqno: u64) {
        let pos = match self.first_chain.as_mut().and_then(|c| c.position_mut(node)) {
            Some(pos) => pos.tracking_mut(tracking),
            None => panic!("no position tracked for node {node}"),
        };
        pos.last_ack_seqno.set(seqno);
    }

    /// Advance one tracking stream up to `ack_seqno`, splicing every
    /// newly satisfied write into `to_commit`.
    fn process_seqno_ack(
        &mut self,
        node: &str,
        tracking: Tracking,
        ack_seqno: u64,
        to_commit: &mut Vec<SyncWrite>,
    ) {
        while let Some(next) = self.node_next(node, tracking) {
            if self.tracked.get(next).by_seqno() > ack_seqno {
                break;
            }
            self.advance_node_position(node, tracking);
            if self.tracked.get(next).is_satisfied() {
                to_commit.push(self.remove_sync_write(next));
            }
        }
        self.update_node_ack(node, tracking, ack_seqno);
    }

    /// Remove one write, first repositioning every cursor that
    /// references it: to the predecessor, or to the end sentinel when
    /// the head is removed.
    fn remove_sync_write(&mut self, handle: WriteHandle) -> SyncWrite {
        let prev = self.tracked.prev(handle);
        if let Some(chain) = self.first_chain.as_mut() {
            for pos in chain.positions_mut() {
                if pos.memory.it == Some(handle) {
                    pos.memory.it = prev;
                }
                if pos.disk.it == Some(handle) {
                    pos.disk.it = prev;
                }
            }
        }
        self.tracked.remove(handle)
    }
}

impl<V: VBucketHandle> ActiveDurabilityMonitor<V> {
    /// Create a monitor for the given vBucket handle.
    pub fn new(vb: V, config: MonitorConfig) -> Self {
        Self {
            vb,
            max_replicas: config.max_replicas,
            state: RwLock::new(State {
                tracked: TrackedWrites::default(),
                first_chain: None,
                second_chain: None,
                last_tracked_seqno: Monotonic::new(0, "last_tracked_seqno"),
                high_prepared_seqno: WeaklyMonotonic::new(0, "high_prepared_seqno"),
            }),
        }
    }

    /// Install a replication topology.
    ///
    /// The document is an array of one or two chains, each an array of
    /// node ids; `null` marks an undefined replica slot, the first
    /// entry of the first chain (the active) must be a string. A
    /// second chain is validated and retained but takes no part in
    /// satisfaction yet. Installing a topology resets every per-node
    /// cursor to the head of the tracked container.
    pub fn set_replication_topology(&self, topology: &Value) -> Result<(), DurabilityError> {
        let vb_state = self.vb.state();
        if vb_state == VBucketState::Replica {
            return Err(DurabilityError::NotActive { state: vb_state });
        }

        let chains = topology
            .as_array()
            .ok_or_else(|| DurabilityError::InvalidTopology {
                reason: "topology is not an array".to_string(),
            })?;
        if chains.is_empty() {
            return Err(DurabilityError::InvalidTopology {
                reason: "topology is empty".to_string(),
            });
        }
        if chains.len() > 2 {
            return Err(DurabilityError::InvalidTopology {
                reason: format!("topology has {} chains, at most 2 allowed", chains.len()),
            });
        }

        let first_nodes = self.parse_chain(&chains[0], "first")?;
        let second_chain = match chains.get(1) {
            Some(chain) => Some(self.parse_chain(chain, "second")?),
            None => None,
        };
        let first_chain = ReplicationChain::new(&first_nodes)?;

        let mut s = self.write_state();
        debug!(
            size = first_chain.size(),
            majority = first_chain.majority(),
            "installing replication topology"
        );
        s.first_chain = Some(first_chain);
        s.second_chain = second_chain;
        Ok(())
    }

    fn parse_chain(
        &self,
        chain: &Value,
        which: &str,
    ) -> Result<Vec<Option<String>>, DurabilityError> {
        let nodes = chain
            .as_array()
            .ok_or_else(|| DurabilityError::InvalidTopology {
                reason: format!("{which} chain is not an array"),
            })?;
        if nodes.is_empty() {
            return Err(DurabilityError::InvalidTopology {
                reason: format!("{which} chain cannot be empty"),
            });
        }
        if nodes.len() > 1 + self.max_replicas {
            return Err(DurabilityError::InvalidTopology {
                reason: format!("too many nodes in {which} chain: {}", nodes.len()),
            });
        }
        nodes
            .iter()
            .map(|node| match node {
                Value::String(name) => Ok(Some(name.clone())),
                Value::Null => Ok(None),
                other => Err(DurabilityError::InvalidTopology {
                    reason: format!("chain nodes must be strings or null, got {other}"),
                }),
            })
            .collect()
    }

    /// Whether the current chain can ever reach majority.
    pub fn is_durability_possible(&self) -> bool {
        self.read_state()
            .first_chain
            .as_ref()
            .map_or(false, |chain| chain.is_durability_possible())
    }

    /// Start tracking a new SyncWrite.
    ///
    /// The item's seqno must be strictly greater than every previously
    /// tracked seqno. The active implicitly holds the prepare in memory
    /// the moment it is enqueued, so its memory cursor advances over
    /// the new entry immediately.
    pub fn add_sync_write(&self, cookie: Cookie, item: QueuedItem) -> Result<(), DurabilityError> {
        if item.reqs.level == DurabilityLevel::None {
            return Err(DurabilityError::LevelNone);
        }
        let vb_state = self.vb.state();
        if vb_state == VBucketState::Replica {
            return Err(DurabilityError::NotActive { state: vb_state });
        }

        let mut s = self.write_state();
        let write = match s.first_chain.as_ref() {
            Some(chain) if chain.is_durability_possible() => {
                SyncWrite::new(cookie, item, chain, Instant::now())
            }
            _ => return Err(DurabilityError::DurabilityImpossible),
        };
        let active = write.active_node().to_string();
        let seqno = write.by_seqno();

        s.last_tracked_seqno.set(seqno);
        s.tracked.push_back(write);
        s.advance_node_position(&active, Tracking::Memory);
        s.update_node_ack(&active, Tracking::Memory, seqno);
        Ok(())
    }

    /// Process a seqno ack from a chain node.
    ///
    /// Both tracking streams advance up to the acked seqno; every write
    /// whose requirements become satisfied is committed, in seqno
    /// order, after the state lock is released.
    pub fn seqno_ack_received(&self, node: &str, prepared_seqno: u64) -> Result<(), DurabilityError> {
        let mut to_commit = Vec::new();
        {
            let mut s = self.write_state();
            match s.first_chain.as_ref() {
                None => return Err(DurabilityError::NoTopology),
                Some(chain) if chain.position(node).is_none() => {
                    return Err(DurabilityError::UnknownNode {
                        node: node.to_string(),
                    });
                }
                Some(_) => {}
            }
            s.process_seqno_ack(node, Tracking::Memory, prepared_seqno, &mut to_commit);
            s.process_seqno_ack(node, Tracking::Disk, prepared_seqno, &mut to_commit);
        }

        for write in &to_commit {
            self.commit(write);
        }
        Ok(())
    }

    /// Advance the active's disk tracking to the vBucket's last
    /// persisted seqno. Expected to be called by the flusher.
    pub fn notify_local_persistence(&self) -> Result<(), DurabilityError> {
        let persisted = self.vb.persistence_seqno();
        let mut to_commit = Vec::new();
        {
            let mut s = self.write_state();
            let active = match s.first_chain.as_ref() {
                None => return Err(DurabilityError::NoTopology),
                Some(chain) => chain.active().to_string(),
            };
            s.process_seqno_ack(&active, Tracking::Disk, persisted, &mut to_commit);
        }

        for write in &to_commit {
            self.commit(write);
        }
        Ok(())
    }

    /// Abort every tracked write whose expiry lies strictly before
    /// `as_of`. Aborts run after the state lock is released.
    pub fn process_timeout(&self, as_of: Instant) -> Result<(), DurabilityError> {
        let vb_state = self.vb.state();
        if vb_state != VBucketState::Active {
            return Err(DurabilityError::NotActive { state: vb_state });
        }

        let mut to_abort = Vec::new();
        {
            let mut s = self.write_state();
            let expired: Vec<WriteHandle> = s
                .tracked
                .iter()
                .filter(|(_, write)| write.is_expired(as_of))
                .map(|(handle, _)| handle)
                .collect();
            for handle in expired {
                to_abort.push(s.remove_sync_write(handle));
            }
        }

        for write in &to_abort {
            debug!(seqno = write.by_seqno(), "aborting timed-out sync write");
            self.abort(write);
        }
        Ok(())
    }

    /// Drop every tracked write without completing it, repositioning
    /// chain cursors as required. Used at rollback. Returns the number
    /// of writes removed.
    pub fn wipe_tracked(&self) -> usize {
        let mut s = self.write_state();
        let handles: Vec<WriteHandle> = s.tracked.iter().map(|(handle, _)| handle).collect();
        let removed = handles.len();
        for handle in handles {
            s.remove_sync_write(handle);
        }
        removed
    }

    /// Number of in-flight SyncWrites.
    pub fn num_tracked(&self) -> usize {
        self.read_state().tracked.len()
    }

    /// Seqnos of the in-flight SyncWrites, head to tail.
    pub fn tracked_seqnos(&self) -> Vec<u64> {
        self.read_state()
            .tracked
            .iter()
            .map(|(_, write)| write.by_seqno())
            .collect()
    }

    /// Seqno of the last write added for tracking.
    pub fn last_tracked_seqno(&self) -> u64 {
        self.read_state().last_tracked_seqno.get()
    }

    /// Highest seqno S with every tracked write at or below S holding
    /// disk acks from a majority.
    pub fn high_prepared_seqno(&self) -> u64 {
        self.read_state().high_prepared_seqno.get()
    }

    /// Number of defined nodes in the first chain.
    pub fn first_chain_size(&self) -> usize {
        self.read_state()
            .first_chain
            .as_ref()
            .map_or(0, |chain| chain.size())
    }

    /// The first chain's majority, 0 without a chain.
    pub fn first_chain_majority(&self) -> u8 {
        self.read_state()
            .first_chain
            .as_ref()
            .map_or(0, |chain| chain.majority())
    }

    /// The second chain's node slots, if one was installed. Retained
    /// for the two-chain failover contract; not consulted for
    /// satisfaction yet.
    pub fn second_chain_nodes(&self) -> Option<Vec<Option<String>>> {
        self.read_state().second_chain.clone()
    }

    /// The (memory, disk) seqnos of the tracked writes the node's
    /// cursors point at. May trail [`Self::node_ack_seqnos`].
    pub fn node_write_seqnos(&self, node: &str) -> Result<NodeSeqnos, DurabilityError> {
        let s = self.read_state();
        let chain = s.first_chain.as_ref().ok_or(DurabilityError::NoTopology)?;
        let pos = chain
            .position(node)
            .ok_or_else(|| DurabilityError::UnknownNode {
                node: node.to_string(),
            })?;
        Ok(NodeSeqnos {
            memory: pos.memory.last_write_seqno.get(),
            disk: pos.disk.last_write_seqno.get(),
        })
    }

    /// The raw (memory, disk) seqnos the node last reported.
    pub fn node_ack_seqnos(&self, node: &str) -> Result<NodeSeqnos, DurabilityError> {
        let s = self.read_state();
        let chain = s.first_chain.as_ref().ok_or(DurabilityError::NoTopology)?;
        let pos = chain
            .position(node)
            .ok_or_else(|| DurabilityError::UnknownNode {
                node: node.to_string(),
            })?;
        Ok(NodeSeqnos {
            memory: pos.memory.last_ack_seqno.get(),
            disk: pos.disk.last_ack_seqno.get(),
        })
    }

    /// Observability snapshot.
    pub fn stats(&self) -> DurabilityMonitorStats {
        let s = self.read_state();
        let mut nodes: Vec<NodePositionStats> = match s.first_chain.as_ref() {
            Some(chain) => chain
                .positions()
                .map(|(node, pos)| NodePositionStats {
                    node: node.to_string(),
                    memory_last_write_seqno: pos.memory.last_write_seqno.get(),
                    memory_last_ack_seqno: pos.memory.last_ack_seqno.get(),
                    disk_last_write_seqno: pos.disk.last_write_seqno.get(),
                    disk_last_ack_seqno: pos.disk.last_ack_seqno.get(),
                })
                .collect(),
            None => Vec::new(),
        };
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        DurabilityMonitorStats {
            state: self.vb.state(),
            num_tracked: s.tracked.len(),
            high_prepared_seqno: s.high_prepared_seqno.get(),
            last_tracked_seqno: s.last_tracked_seqno.get(),
            first_chain_size: s.first_chain.as_ref().map_or(0, |c| c.size()),
            first_chain_majority: s.first_chain.as_ref().map_or(0, |c| c.majority()),
            nodes,
        }
    }

    fn commit(&self, write: &SyncWrite) {
        if let Err(reason) = self
            .vb
            .commit(write.key(), write.by_seqno(), None, write.cookie())
        {
            panic!(
                "vbucket commit failed for seqno {}: {reason}",
                write.by_seqno()
            );
        }
    }

    fn abort(&self, write: &SyncWrite) {
        if let Err(reason) = self
            .vb
            .abort(write.key(), write.by_seqno(), None, write.cookie())
        {
            panic!(
                "vbucket abort failed for seqno {}: {reason}",
                write.by_seqno()
            );
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(_) => panic!("durability monitor lock poisoned"),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(_) => panic!("durability monitor lock poisoned"),
        }
    }
}
