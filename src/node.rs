//! Wire-level node payloads and the live-handle trait.
//!
//! Split into a plain data value (`NodeInfo`, what travels inside replies)
//! and a trait (`RemoteHandle`, in `transport.rs`) for the live,
//! transport-owned object the core actually holds in its tables.

use std::fmt;

/// `{ id, addr }` exactly as carried on the wire (§6). Distinct from a live
/// [`crate::transport::RemoteHandle`]: a `NodeInfo` is an inert value with no
/// connection behind it until the embedder calls `Connect`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub id: Vec<u8>,
    pub addr: String,
}

impl NodeInfo {
    pub fn new(id: Vec<u8>, addr: impl Into<String>) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }

    /// Hex rendering of the identifier, for logging.
    pub fn hash_id(&self) -> String {
        hex::encode(&self.id)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash_id(), self.addr)
    }
}
