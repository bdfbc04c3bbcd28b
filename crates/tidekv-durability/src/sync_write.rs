//! A tracked durable write and its acknowledgement state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::chain::ReplicationChain;
use crate::types::{Cookie, DurabilityLevel, QueuedItem, StoredKey, Tracking};

#[derive(Debug, Clone, Copy, Default)]
struct Ack {
    memory: bool,
    disk: bool,
}

/// One in-flight SyncWrite: the queued item plus per-node ack flags,
/// cached ack counters and the absolute expiry time.
#[derive(Debug)]
pub(crate) struct SyncWrite {
    cookie: Cookie,
    item: QueuedItem,
    /// Ack flags, keyed by every defined chain member.
    acks: HashMap<String, Ack>,
    /// Cached counters so satisfaction checks avoid scanning the map.
    ack_count_memory: u8,
    ack_count_disk: u8,
    /// Majority of the chain this write was tracked under.
    majority: u8,
    /// Absolute expiry, when the item carried a timeout.
    expiry: Option<Instant>,
    /// The chain's active node, needed for the persist-on-master check.
    active: String,
}

impl SyncWrite {
    pub fn new(cookie: Cookie, item: QueuedItem, chain: &ReplicationChain, now: Instant) -> Self {
        let expiry = item
            .reqs
            .timeout_ms
            .map(|ms| now + Duration::from_millis(ms));
        let acks = chain
            .nodes()
            .map(|node| (node.to_string(), Ack::default()))
            .collect();
        Self {
            cookie,
            item,
            acks,
            ack_count_memory: 0,
            ack_count_disk: 0,
            majority: chain.majority(),
            expiry,
            active: chain.active().to_string(),
        }
    }

    pub fn key(&self) -> &StoredKey {
        &self.item.key
    }

    pub fn by_seqno(&self) -> u64 {
        self.item.by_seqno
    }

    pub fn cookie(&self) -> Cookie {
        self.cookie
    }

    pub fn active_node(&self) -> &str {
        &self.active
    }

    pub fn majority(&self) -> u8 {
        self.majority
    }

    pub fn disk_ack_count(&self) -> u8 {
        self.ack_count_disk
    }

    /// Record an ack from `node`. Each (node, tracking) pair may be
    /// marked at most once over the write's lifetime.
    pub fn ack(&mut self, node: &str, tracking: Tracking) {
        let ack = match self.acks.get_mut(node) {
            Some(ack) => ack,
            None => panic!("sync write ack from node {node} which is not in the ack map"),
        };
        let flag = match tracking {
            Tracking::Memory => &mut ack.memory,
            Tracking::Disk => &mut ack.disk,
        };
        if *flag {
            panic!("duplicate {tracking} ack for node {node} on seqno {}", self.item.by_seqno);
        }
        *flag = true;
        match tracking {
            Tracking::Memory => self.ack_count_memory += 1,
            Tracking::Disk => self.ack_count_disk += 1,
        }
    }

    /// Whether the durability requirements are met by the recorded acks.
    pub fn is_satisfied(&self) -> bool {
        match self.item.reqs.level {
            DurabilityLevel::Majority => self.ack_count_memory >= self.majority,
            DurabilityLevel::MajorityAndPersistOnMaster => {
                self.ack_count_memory >= self.majority
                    && self.acks.get(&self.active).map_or(false, |a| a.disk)
            }
            DurabilityLevel::PersistToMajority => self.ack_count_disk >= self.majority,
            // Rejected at ingress; a tracked None write is corruption.
            DurabilityLevel::None => {
                panic!("tracked SyncWrite with durability level None")
            }
        }
    }

    /// Whether the write's expiry time lies strictly before `as_of`.
    pub fn is_expired(&self, as_of: Instant) -> bool {
        self.expiry.map_or(false, |expiry| expiry < as_of)
    }
}
