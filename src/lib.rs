//! Core of a Chord distributed hash table overlay.
//!
//! This crate implements ring arithmetic, the bounded neighbor tables
//! (successor list, predecessor list, finger table), the stabilization
//! protocol that keeps them converged, and the two key-location RPCs
//! (`FindSuccessors`/`FindPredecessors`) that answer "who owns this key".
//!
//! What it deliberately does not implement: connection objects, the
//! `Direct`/`Broadcast` routing multiplexer, wire encoding, and CLI/config
//! parsing. Those are the embedder's concern, reached through the
//! [`transport`] module's traits.

pub mod config;
pub mod core;
pub mod error;
pub mod finger_table;
pub mod messages;
pub mod middleware;
pub mod neighbor_list;
pub mod node;
pub mod ring;
pub mod router;
mod stabilization;
pub mod transport;

pub use config::Config;
pub use core::{Chord, ChordTables, Phase, WeakChord};
pub use error::ChordError;
pub use messages::{RelayMessage, RelayReply, RoutingType};
pub use middleware::{Event, MiddlewareStore};
pub use node::NodeInfo;
pub use transport::{RemoteHandle, Transport};
