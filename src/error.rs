use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::NodeId;
use crate::protocol::MessageKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Problems with a topology file or with an edge update. Fatal for the
/// file being run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("topology is empty")]
    Empty,

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("line {line}: node id {id} out of range 1..={count}")]
    IdOutOfRange { line: usize, id: usize, count: usize },

    #[error("line {line}: node {id} declared twice")]
    DuplicateNode { line: usize, id: NodeId },

    #[error("node {0} is never declared")]
    MissingNode(NodeId),

    #[error("invalid weight {weight} on link {a}-{b}")]
    InvalidWeight { a: NodeId, b: NodeId, weight: f64 },

    #[error("link {a}-{b} is not declared by node {b} with the same weight")]
    AsymmetricLink { a: NodeId, b: NodeId },

    #[error("link {a}-{b}: ports do not cross (send/listen must mirror)")]
    PortMismatch { a: NodeId, b: NodeId },

    #[error("no link between {a} and {b}")]
    UnknownLink { a: NodeId, b: NodeId },

    #[error("node {0} is unreachable from node 1")]
    Disconnected(NodeId),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("channel {addr}: {source}")]
    Channel {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("message of {size} bytes exceeds the {limit}-byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("protocol violation: {kind:?} message from node {from} on a broadcast-only channel")]
    ProtocolViolation { kind: MessageKind, from: NodeId },

    #[error("node {node} did not converge in round {round} within {timeout:?}")]
    ConvergenceTimeout {
        node: NodeId,
        round: u64,
        timeout: Duration,
    },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Networking faults that the flood recovers from by path redundancy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Channel { .. } | Error::Codec(_))
    }
}
