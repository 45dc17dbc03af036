//! The transport boundary (§1, §6): everything this crate treats as an
//! external collaborator rather than implements itself.

use crate::error::ChordError;
use crate::messages::{RelayMessage, RelayReply};

/// A live, transport-owned handle to a remote node. The core never
/// constructs one and never mutates its interior. It only holds it,
/// compares its id/addr, and observes `is_connected`.
pub trait RemoteHandle: Send + Sync + 'static {
    fn id(&self) -> &[u8];
    fn addr(&self) -> &str;
    /// `false` once the transport has observed a disconnect. The core does
    /// not poll this on a timer; it relies on `Chord::on_remote_disconnected`
    /// being called, but stabilization loops may consult it opportunistically
    /// when deciding whether a cached handle is worth a request.
    fn is_connected(&self) -> bool;
}

/// Everything the Chord core needs from the surrounding node layer:
/// outbound connection establishment and synchronous request/reply.
/// Connection establishment is asynchronous: success is observed later via
/// [`crate::core::Chord::on_remote_ready`], not through `connect`'s return
/// value.
pub trait Transport: Send + Sync + 'static {
    type Handle: RemoteHandle + Clone;

    /// Begins connecting to `addr`. `id`, when known in advance, lets the
    /// transport validate the peer's identity once connected. Returns once
    /// the attempt has been dispatched, not once it has completed.
    fn connect(&self, addr: &str, id: Option<&[u8]>) -> Result<(), ChordError>;

    /// Issues one synchronous request/reply exchange against `handle`.
    fn send_message_sync(
        &self,
        handle: &Self::Handle,
        msg: RelayMessage,
    ) -> Result<RelayReply, ChordError>;
}
