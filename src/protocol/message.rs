use serde::{Deserialize, Serialize};

use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Broadcast,
    /// Decodes, but never valid on a neighbor channel.
    Acknowledgement,
    /// Decodes, but never valid on a neighbor channel.
    Private,
    /// Any kind this build does not recognize.
    #[serde(other)]
    Unknown,
}

/// Undirected edge, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    low: NodeId,
    high: NodeId,
}

impl Edge {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.low, self.high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    pub edge: Edge,
    pub weight: f64,
}

impl LinkState {
    pub fn new(a: NodeId, b: NodeId, weight: f64) -> Self {
        Self {
            edge: Edge::new(a, b),
            weight,
        }
    }
}

/// Wire envelope. Fields are private: a message is never altered after
/// construction, and every forward builds a new one with [`Message::relay`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    kind: MessageKind,
    source: NodeId,
    sequence: u64,
    link_states: Vec<LinkState>,
}

impl Message {
    pub fn broadcast(source: NodeId, sequence: u64, link_states: Vec<LinkState>) -> Self {
        Self::new(MessageKind::Broadcast, source, sequence, link_states)
    }

    pub fn new(
        kind: MessageKind,
        source: NodeId,
        sequence: u64,
        link_states: Vec<LinkState>,
    ) -> Self {
        Self {
            kind,
            source,
            sequence,
            link_states,
        }
    }

    /// Fresh copy for one outbound send.
    pub fn relay(&self) -> Self {
        Self::new(self.kind, self.source, self.sequence, self.link_states.clone())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn link_states(&self) -> &[LinkState] {
        &self.link_states
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
