//! The `m`-slot finger table (§3, §4.5).

use crate::neighbor_list::NeighborList;
use crate::ring;
use crate::transport::RemoteHandle;

/// Slot `i` covers `[localId + 2^i, localId + 2^(i+1) - 1]` inclusive. Each
/// slot is its own [`NeighborList`]; its `(start, end]` endpoints are
/// shifted back by one identifier so the generic half-open-forward formula
/// produces that inclusive-inclusive range without a special case.
pub struct FingerTable<T: RemoteHandle + Clone> {
    slots: Vec<NeighborList<T>>,
}

impl<T: RemoteHandle + Clone> FingerTable<T> {
    pub fn new(local_id: &[u8], m: usize, cap_per_slot: usize) -> Self {
        let slots = (0..m)
            .map(|i| {
                let slot_start = ring::prev_id(&ring::power_offset(local_id, i as u32));
                let slot_end = ring::prev_id(&ring::power_offset(local_id, (i + 1) as u32));
                NeighborList::new(local_id.to_vec(), slot_start, slot_end, false, cap_per_slot)
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, i: usize) -> &NeighborList<T> {
        &self.slots[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborList<T>> {
        self.slots.iter()
    }
}
