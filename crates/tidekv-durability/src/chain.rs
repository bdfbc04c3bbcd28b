//! Replication chain and per-node cursor positions.

use std::collections::HashMap;

use crate::error::DurabilityError;
use crate::monotonic::WeaklyMonotonic;
use crate::tracked::WriteHandle;
use crate::types::Tracking;

/// Cursor state for one tracking stream (memory or disk) of one node.
///
/// The cursor points at the last SyncWrite acknowledged by the node, an
/// optimisation that avoids rescanning the container on every ack.
/// `None` is the end sentinel: before the first ack, and after the
/// pointed element was removed from the head. `last_write_seqno` keeps
/// the node's seqno state alive across such removals; `last_ack_seqno`
/// records the raw value the node reported, which may run far ahead of
/// the tracked container.
#[derive(Debug)]
pub(crate) struct Position {
    pub it: Option<WriteHandle>,
    pub last_write_seqno: WeaklyMonotonic<u64>,
    pub last_ack_seqno: WeaklyMonotonic<u64>,
}

impl Position {
    fn new() -> Self {
        Self {
            it: None,
            last_write_seqno: WeaklyMonotonic::new(0, "last_write_seqno"),
            last_ack_seqno: WeaklyMonotonic::new(0, "last_ack_seqno"),
        }
    }
}

/// The memory and disk positions of one chain node.
#[derive(Debug)]
pub(crate) struct NodePosition {
    pub memory: Position,
    pub disk: Position,
}

impl NodePosition {
    fn new() -> Self {
        Self {
            memory: Position::new(),
            disk: Position::new(),
        }
    }

    pub fn tracking(&self, tracking: Tracking) -> &Position {
        match tracking {
            Tracking::Memory => &self.memory,
            Tracking::Disk => &self.disk,
        }
    }

    pub fn tracking_mut(&mut self, tracking: Tracking) -> &mut Position {
        match tracking {
            Tracking::Memory => &mut self.memory,
            Tracking::Disk => &mut self.disk,
        }
    }
}

/// A vBucket replication chain: the active node and its replicas.
///
/// Replica slots may be undefined (mid-failover or mid-rebalance);
/// undefined slots carry no position and never ack, but they still
/// count towards the majority denominator, so a chain with too many
/// undefined slots cannot satisfy durability.
#[derive(Debug)]
pub(crate) struct ReplicationChain {
    /// Position index keyed by node id; defined nodes only.
    positions: HashMap<String, NodePosition>,
    /// chain-length / 2 + 1, over all slots (defined or not).
    majority: u8,
    active: String,
}

impl ReplicationChain {
    /// Build a chain from slots in wire order; `None` marks an
    /// undefined replica. The first slot (the active) must be defined
    /// and defined nodes must be unique.
    pub fn new(nodes: &[Option<String>]) -> Result<Self, DurabilityError> {
        let active = match nodes.first() {
            Some(Some(name)) => name.clone(),
            _ => {
                return Err(DurabilityError::InvalidTopology {
                    reason: "active node cannot be undefined".to_string(),
                })
            }
        };
        let majority = (nodes.len() / 2 + 1) as u8;

        let mut positions = HashMap::new();
        for node in nodes.iter().flatten() {
            if positions.insert(node.clone(), NodePosition::new()).is_some() {
                return Err(DurabilityError::InvalidTopology {
                    reason: format!("duplicate node: {node}"),
                });
            }
        }

        Ok(Self {
            positions,
            majority,
            active,
        })
    }

    /// Number of defined nodes.
    pub fn size(&self) -> usize {
        self.positions.len()
    }

    pub fn majority(&self) -> u8 {
        self.majority
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    /// Whether enough nodes are defined to ever reach majority.
    pub fn is_durability_possible(&self) -> bool {
        self.size() >= self.majority as usize
    }

    pub fn position(&self, node: &str) -> Option<&NodePosition> {
        self.positions.get(node)
    }

    pub fn position_mut(&mut self, node: &str) -> Option<&mut NodePosition> {
        self.positions.get_mut(node)
    }

    /// Iterate defined node ids.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Iterate (node, position) pairs.
    pub fn positions(&self) -> impl Iterator<Item = (&str, &NodePosition)> {
        self.positions.iter().map(|(node, pos)| (node.as_str(), pos))
    }

    /// Iterate positions mutably (cursor repositioning at removal).
    pub fn positions_mut(&mut self) -> impl Iterator<Item = &mut NodePosition> {
        self.positions.values_mut()
    }
}
