//! Observer hooks into join/neighbor lifecycle events (§4.6).

use std::sync::RwLock;

use crate::node::NodeInfo;

/// Events emitted by the Chord core as tables are mutated. `RemoteNodeReady`
/// and `RemoteNodeDisconnected` are consumed from the transport layer, not
/// re-emitted: they drive [`crate::core::Chord::on_remote_ready`] /
/// `on_remote_disconnected` directly rather than going through this store.
#[derive(Debug, Clone)]
pub enum Event {
    SuccessorAdded { node: NodeInfo, index: usize },
    PredecessorAdded { node: NodeInfo, index: usize },
    FingerTableAdded { slot: usize, node: NodeInfo, index: usize },
    NeighborAdded { node: NodeInfo },
    NeighborRemoved { node: NodeInfo },
}

/// A handler: `true` continues to the next handler, `false` short-circuits
/// the dispatch for this event.
pub type Handler = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// Registration is additive and rare; invocation is hot and synchronous, run
/// from the thread that produced the event, so this store is a read-mostly
/// lock (registration write-locks briefly; dispatch read-locks).
#[derive(Default)]
pub struct MiddlewareStore {
    handlers: RwLock<Vec<Handler>>,
}

impl MiddlewareStore {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler, run after every previously-registered one.
    pub fn register(&self, handler: Handler) {
        self.handlers.write().unwrap().push(handler);
    }

    /// Runs every handler in registration order until one returns `false`.
    pub fn dispatch(&self, event: &Event) {
        for handler in self.handlers.read().unwrap().iter() {
            if !handler(event) {
                break;
            }
        }
    }
}
