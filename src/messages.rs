//! Wire message shapes (§6). Framing/encoding is an external collaborator;
//! these types are the payloads the core builds and interprets.

use crate::node::NodeInfo;

/// Routing discriminant carried on the envelope. Only [`RoutingType::Relay`]
/// is interpreted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingType {
    Direct,
    Relay,
    Broadcast,
}

/// A request this crate can send or receive over `SendMessageSync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    GetSuccAndPred { num_succ: u32, num_pred: u32 },
    FindSuccessors { key: Vec<u8>, num_succ: u32 },
    FindPredecessors { key: Vec<u8>, num_pred: u32 },
}

/// The reply to a [`RelayMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayReply {
    GetSuccAndPred {
        successors: Vec<NodeInfo>,
        predecessors: Vec<NodeInfo>,
    },
    FindSuccessors {
        successors: Vec<NodeInfo>,
    },
    FindPredecessors {
        predecessors: Vec<NodeInfo>,
    },
}

impl RelayReply {
    pub fn into_successors(self) -> Result<Vec<NodeInfo>, crate::error::ChordError> {
        match self {
            RelayReply::FindSuccessors { successors } => Ok(successors),
            other => Err(crate::error::ChordError::Decode(format!(
                "expected FindSuccessors reply, got {other:?}"
            ))),
        }
    }

    pub fn into_predecessors(self) -> Result<Vec<NodeInfo>, crate::error::ChordError> {
        match self {
            RelayReply::FindPredecessors { predecessors } => Ok(predecessors),
            other => Err(crate::error::ChordError::Decode(format!(
                "expected FindPredecessors reply, got {other:?}"
            ))),
        }
    }

    pub fn into_succ_and_pred(
        self,
    ) -> Result<(Vec<NodeInfo>, Vec<NodeInfo>), crate::error::ChordError> {
        match self {
            RelayReply::GetSuccAndPred {
                successors,
                predecessors,
            } => Ok((successors, predecessors)),
            other => Err(crate::error::ChordError::Decode(format!(
                "expected GetSuccAndPred reply, got {other:?}"
            ))),
        }
    }
}
