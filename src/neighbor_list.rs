//! Bounded, sorted, deduplicated neighbor sets (§4.2).

use std::cmp::Ordering;
use std::sync::Mutex;

use crate::node::NodeInfo;
use crate::ring;
use crate::transport::RemoteHandle;

struct Inner<T> {
    start_id: Vec<u8>,
    end_id: Vec<u8>,
    nodes: Vec<T>,
}

/// A neighbor set covering the half-open arc `(start_id, end_id]`, or
/// `[start_id, end_id)` walking backward when `reversed`. Every mutator
/// takes the internal lock, does its work, and releases it before
/// returning. Callers must never hold a `NeighborList` lock across an RPC or a
/// `Connect` call (§5).
pub struct NeighborList<T: RemoteHandle + Clone> {
    local_id: Vec<u8>,
    reversed: bool,
    cap: usize,
    inner: Mutex<Inner<T>>,
}

impl<T: RemoteHandle + Clone> NeighborList<T> {
    /// `cap == 0` means unbounded (used for the informational `neighbors`
    /// union set).
    pub fn new(local_id: Vec<u8>, start_id: Vec<u8>, end_id: Vec<u8>, reversed: bool, cap: usize) -> Self {
        Self {
            local_id,
            reversed,
            cap,
            inner: Mutex::new(Inner {
                start_id,
                end_id,
                nodes: Vec::new(),
            }),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    /// `(startID, endID]` for forward lists, `[startID, endID)` walking
    /// backward for reversed ones.
    pub fn is_id_in_range(&self, id: &[u8]) -> bool {
        let inner = self.inner.lock().unwrap();
        self.range_contains(&inner.start_id, &inner.end_id, id)
    }

    fn range_contains(&self, start: &[u8], end: &[u8], id: &[u8]) -> bool {
        if self.reversed {
            id == start || ring::between(end, start, id)
        } else {
            id == end || ring::between(start, end, id)
        }
    }

    /// Ascending sort key: forward distance from `start_id` for normal
    /// lists, backward distance from `start_id` (i.e. `dist(x, start_id)`)
    /// for reversed ones.
    fn key(&self, start: &[u8], x: &[u8]) -> Vec<u8> {
        if self.reversed {
            ring::dist(x, start)
        } else {
            ring::dist(start, x)
        }
    }

    fn cmp_ids(&self, start: &[u8], a: &[u8], b: &[u8]) -> Ordering {
        self.key(start, a).cmp(&self.key(start, b))
    }

    /// Inserts `node`. Rejects self, out-of-range, and duplicate ids. When
    /// full, evicts the current farthest entry only if `node` sorts
    /// strictly before it; returns the insertion index on success.
    pub fn add(&self, node: T) -> Option<usize> {
        if node.id() == self.local_id.as_slice() {
            return None;
        }

        let mut inner = self.inner.lock().unwrap();
        if !self.range_contains(&inner.start_id, &inner.end_id, node.id()) {
            return None;
        }
        if inner.nodes.iter().any(|n| n.id() == node.id()) {
            return None;
        }

        if self.cap > 0 && inner.nodes.len() >= self.cap {
            let start = inner.start_id.clone();
            let worst_idx = (0..inner.nodes.len())
                .max_by(|&i, &j| self.cmp_ids(&start, inner.nodes[i].id(), inner.nodes[j].id()))
                .unwrap();
            let worse_than_worst = self.cmp_ids(&start, node.id(), inner.nodes[worst_idx].id())
                != Ordering::Less;
            if worse_than_worst {
                return None;
            }
            inner.nodes.remove(worst_idx);
        }

        let start = inner.start_id.clone();
        let pos = inner
            .nodes
            .binary_search_by(|n| self.cmp_ids(&start, n.id(), node.id()))
            .unwrap_or_else(|e| e);
        inner.nodes.insert(pos, node);
        Some(pos)
    }

    /// The `startID` endpoint of this list's arc, as used by the
    /// find-new-predecessor and find-new-finger stabilization scans.
    pub fn start_id(&self) -> Vec<u8> {
        self.inner.lock().unwrap().start_id.clone()
    }

    /// Whether `a` sorts strictly before `b` under this list's ordering
    /// (i.e. `a` is the better candidate of the two).
    pub fn closer(&self, a: &[u8], b: &[u8]) -> bool {
        let inner = self.inner.lock().unwrap();
        self.cmp_ids(&inner.start_id, a, b) == Ordering::Less
    }

    /// Removes the entry with this id, if present.
    pub fn remove(&self, id: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.nodes.len();
        inner.nodes.retain(|n| n.id() != id);
        inner.nodes.len() != before
    }

    pub fn exists(&self, id: &[u8]) -> bool {
        self.inner.lock().unwrap().nodes.iter().any(|n| n.id() == id)
    }

    /// The entry minimal under `cmp`, or `None` if empty.
    pub fn get_first(&self) -> Option<T> {
        self.inner.lock().unwrap().nodes.first().cloned()
    }

    /// A snapshot of the live handles, in sort order.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().unwrap().nodes.clone()
    }

    /// Wire-ready node list, preserving order. When `include_disconnected`
    /// is `false`, entries whose transport handle reports a drop are
    /// skipped rather than shipped to a peer that would immediately find
    /// them dead.
    pub fn to_node_list(&self, include_disconnected: bool) -> Vec<NodeInfo> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|n| include_disconnected || n.is_connected())
            .map(|n| NodeInfo::new(n.id().to_vec(), n.addr().to_string()))
            .collect()
    }
}
