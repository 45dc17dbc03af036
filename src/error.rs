//! Error kinds surfaced by the Chord core.

/// Errors produced by ring operations, neighbor-list mutation, and the
/// `Find*`/stabilization RPCs.
#[derive(Debug, thiserror::Error)]
pub enum ChordError {
    /// An identifier did not match the overlay's configured byte length.
    #[error("invalid identifier: expected {expected} bytes, got {actual}")]
    InvalidIdentifier { expected: usize, actual: usize },

    /// `FindSuccessors`/`FindPredecessors` was invoked before the node has
    /// any live successor.
    #[error("no successor available; node has not joined the ring")]
    NoSuccessor,

    /// `Connect` or `SendMessageSync` failed on the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A reply body could not be decoded into the expected shape.
    #[error("failed to decode reply: {0}")]
    Decode(String),
}

impl ChordError {
    /// Wraps any transport-layer failure as a `ChordError::Transport`.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        ChordError::Transport(err.to_string())
    }
}
