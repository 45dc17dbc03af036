//! The relay router (§4.4): a greedy, side-effect-free routing step over the
//! Chord tables. `Direct`/`Broadcast` routing is out of scope; this is the
//! only router this crate defines.

use std::sync::Arc;

use crate::core::ChordTables;
use crate::ring;
use crate::transport::RemoteHandle;

/// Consults `successors ∪ fingerTable ∪ predecessors` to pick the next hop
/// toward a destination identifier. Never mutates any table.
pub struct RelayRouter<H: RemoteHandle + Clone> {
    tables: Arc<ChordTables<H>>,
}

impl<H: RemoteHandle + Clone> RelayRouter<H> {
    pub fn new(tables: Arc<ChordTables<H>>) -> Self {
        Self { tables }
    }

    /// `None` means `dest == localId`: the caller should terminate locally.
    /// Otherwise returns the best next hop, falling back to the first
    /// successor when no table entry makes progress toward `dest`.
    pub fn select_next_hop(&self, dest: &[u8]) -> Option<H> {
        self.ranked_candidates(dest).into_iter().next()
    }

    /// The same selection as [`Self::select_next_hop`], but as a ranked
    /// list (best first) so a caller can retry the next candidate when the
    /// chosen hop turns out to be unreachable (§4.4 step 4).
    pub fn ranked_candidates(&self, dest: &[u8]) -> Vec<H> {
        if dest == self.tables.local_id.as_slice() {
            return Vec::new();
        }

        let mut candidates = self.tables.successors.snapshot();
        candidates.extend(self.tables.predecessors.snapshot());
        for slot in self.tables.fingers.iter() {
            candidates.extend(slot.snapshot());
        }

        let local_id = &self.tables.local_id;
        let mut in_range: Vec<H> = candidates
            .into_iter()
            .filter(|c| ring::between(local_id, dest, c.id()))
            .collect();
        in_range.sort_by_key(|c| ring::dist(c.id(), dest));
        in_range.dedup_by(|a, b| a.id() == b.id());

        if let Some(first_successor) = self.tables.successors.get_first() {
            if !in_range.iter().any(|c| c.id() == first_successor.id()) {
                in_range.push(first_successor);
            }
        }

        in_range
    }
}
