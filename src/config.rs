//! Overlay-wide configuration knobs (§6).

use std::time::Duration;

/// Configuration shared by every table and maintenance loop in a single
/// `Chord` instance. Constructed once by the embedder and handed to
/// [`crate::core::Chord::new`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Node-identifier width in bits (`m`). Identifier byte length is
    /// `node_id_bits / 8`.
    pub node_id_bits: usize,
    /// Minimum/target size of the successor list.
    pub min_num_successors: usize,
    /// Minimum/target size of the predecessor list.
    pub min_num_predecessors: usize,
    /// Target size of each finger-table slot's neighbor list.
    pub num_finger_successors: usize,
    /// Base duration the jittered stabilization timers sample around.
    pub base_stabilize_interval: Duration,
}

impl Config {
    /// Identifier byte length implied by `node_id_bits`.
    pub fn id_bytes(&self) -> usize {
        self.node_id_bits / 8
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id_bits: 160,
            min_num_successors: 4,
            min_num_predecessors: 4,
            num_finger_successors: 1,
            base_stabilize_interval: Duration::from_secs(2),
        }
    }
}
