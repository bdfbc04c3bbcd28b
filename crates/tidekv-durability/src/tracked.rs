//! The container of in-flight SyncWrites.
//!
//! Chain cursors need element handles that survive appends and the
//! removal of arbitrary interior elements, so the container is a
//! doubly linked list over an arena of reusable slots. A cursor is an
//! `Option<WriteHandle>`, with `None` as the explicit end sentinel;
//! advancing from the sentinel yields the head.

use crate::sync_write::SyncWrite;

/// Stable handle to one tracked write. Valid until that write is
/// removed; unaffected by operations on other elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteHandle(usize);

#[derive(Debug)]
struct Node {
    write: SyncWrite,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered container of tracked writes, seqnos strictly increasing
/// from head to tail.
#[derive(Debug, Default)]
pub(crate) struct TrackedWrites {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl TrackedWrites {
    /// Append a write at the tail and return its handle.
    pub fn push_back(&mut self, write: SyncWrite) -> WriteHandle {
        let node = Node {
            write,
            prev: self.tail,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        WriteHandle(idx)
    }

    /// Unlink and return the write at `handle`.
    ///
    /// The caller must have repositioned every cursor that referenced
    /// the element beforehand.
    pub fn remove(&mut self, handle: WriteHandle) -> SyncWrite {
        let node = match self.slots[handle.0].take() {
            Some(node) => node,
            None => panic!("tracked writes: removal through a dangling handle"),
        };
        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.free.push(handle.0);
        self.len -= 1;
        node.write
    }

    /// Borrow the write at `handle`.
    pub fn get(&self, handle: WriteHandle) -> &SyncWrite {
        &self.node(handle.0).write
    }

    /// Mutably borrow the write at `handle`.
    pub fn get_mut(&mut self, handle: WriteHandle) -> &mut SyncWrite {
        &mut self.node_mut_checked(handle.0).write
    }

    /// The element after a cursor position; from the end sentinel
    /// (`None`) this is the head.
    pub fn next(&self, cursor: Option<WriteHandle>) -> Option<WriteHandle> {
        match cursor {
            None => self.head.map(WriteHandle),
            Some(handle) => self.node(handle.0).next.map(WriteHandle),
        }
    }

    /// The element before `handle`, or `None` when `handle` is the head.
    pub fn prev(&self, handle: WriteHandle) -> Option<WriteHandle> {
        self.node(handle.0).prev.map(WriteHandle)
    }

    /// Number of tracked writes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Iterate head to tail.
    pub fn iter(&self) -> impl Iterator<Item = (WriteHandle, &SyncWrite)> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let node = self.node(idx);
            cursor = node.next;
            Some((WriteHandle(idx), &node.write))
        })
    }

    fn node(&self, idx: usize) -> &Node {
        match self.slots[idx].as_ref() {
            Some(node) => node,
            None => panic!("tracked writes: access through a dangling handle"),
        }
    }

    fn node_mut_checked(&mut self, idx: usize) -> &mut Node {
        match self.slots[idx].as_mut() {
            Some(node) => node,
            None => panic!("tracked writes: access through a dangling handle"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.node_mut_checked(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ReplicationChain;
    use crate::types::{DurabilityLevel, DurabilityRequirements, QueuedItem, StoredKey};
    use std::time::Instant;

    fn write(seqno: u64) -> SyncWrite {
        let chain = ReplicationChain::new(&[Some("a".to_string())]).unwrap();
        SyncWrite::new(
            1,
            QueuedItem {
                key: StoredKey::from("k"),
                by_seqno: seqno,
                reqs: DurabilityRequirements::level(DurabilityLevel::Majority),
            },
            &chain,
            Instant::now(),
        )
    }

    fn seqnos(tracked: &TrackedWrites) -> Vec<u64> {
        tracked.iter().map(|(_, w)| w.by_seqno()).collect()
    }

    #[test]
    fn test_push_and_iterate() {
        let mut tracked = TrackedWrites::default();
        for seqno in [1, 2, 3] {
            tracked.push_back(write(seqno));
        }
        assert_eq!(tracked.len(), 3);
        assert_eq!(seqnos(&tracked), vec![1, 2, 3]);
    }

    #[test]
    fn test_next_from_sentinel_is_head() {
        let mut tracked = TrackedWrites::default();
        assert_eq!(tracked.next(None), None);
        let head = tracked.push_back(write(1));
        assert_eq!(tracked.next(None), Some(head));
    }

    #[test]
    fn test_remove_interior_relinks() {
        let mut tracked = TrackedWrites::default();
        let first = tracked.push_back(write(1));
        let second = tracked.push_back(write(2));
        let third = tracked.push_back(write(3));

        let removed = tracked.remove(second);
        assert_eq!(removed.by_seqno(), 2);
        assert_eq!(seqnos(&tracked), vec![1, 3]);
        assert_eq!(tracked.next(Some(first)), Some(third));
        assert_eq!(tracked.prev(third), Some(first));
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut tracked = TrackedWrites::default();
        let first = tracked.push_back(write(1));
        let _second = tracked.push_back(write(2));
        let third = tracked.push_back(write(3));

        tracked.remove(first);
        assert_eq!(seqnos(&tracked), vec![2, 3]);
        tracked.remove(third);
        assert_eq!(seqnos(&tracked), vec![2]);
    }

    #[test]
    fn test_slot_reuse_after_removal() {
        let mut tracked = TrackedWrites::default();
        let first = tracked.push_back(write(1));
        tracked.remove(first);
        assert_eq!(tracked.len(), 0);
        tracked.push_back(write(2));
        tracked.push_back(write(3));
        assert_eq!(seqnos(&tracked), vec![2, 3]);
    }

    #[test]
    #[should_panic(expected = "dangling handle")]
    fn test_dangling_handle_panics() {
        let mut tracked = TrackedWrites::default();
        let first = tracked.push_back(write(1));
        tracked.remove(first);
        tracked.get(first);
    }
}
