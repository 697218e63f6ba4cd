use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use crate::NodeId;
use crate::error::{Error, Result};
use crate::network::channel;
use crate::node::{Node, NodeState};
use crate::protocol::{Message, MessageKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutcome {
    /// Newer than anything seen from the source; re-forward to these neighbors.
    Accepted { forward_to: Vec<NodeId> },
    /// Equal or older sequence number. Dropped silently.
    Stale { seen: u64 },
}

/// Flooding with sequence numbers, applied to one received message.
///
/// Accepts iff `sequence > seen[source]`; on acceptance records the sequence,
/// applies the link-state facts and names every neighbor except the one the
/// message came from. The caller must hold the node's lock for the whole call
/// and for the forwards that follow.
pub fn flood(state: &mut NodeState, message: &Message, arrived_from: NodeId) -> FloodOutcome {
    let source = message.source();
    if !state.sequence_mut().observe(source, message.sequence()) {
        let seen = state.sequence().get(source).unwrap_or(0);
        return FloodOutcome::Stale { seen };
    }

    state.apply_link_states(message.link_states());

    let forward_to = state
        .links()
        .neighbors()
        .filter(|&neighbor| neighbor != arrived_from)
        .collect();
    FloodOutcome::Accepted { forward_to }
}

/// Short-lived unit spawned per accepted connection.
pub struct FloodHandler {
    node: Arc<Node>,
    arrived_from: NodeId,
}

impl FloodHandler {
    pub fn new(node: Arc<Node>, arrived_from: NodeId) -> Self {
        Self { node, arrived_from }
    }

    pub async fn run(self, stream: TcpStream) {
        let message = match channel::receive(stream, self.node.config().read_timeout()).await {
            Ok(message) => message,
            Err(e) => {
                warn!(node = self.node.id(), from = self.arrived_from, "discarding unreadable message: {}", e);
                return;
            }
        };

        match self.process(message).await {
            Ok(_) => {}
            Err(e @ Error::ProtocolViolation { .. }) => {
                error!(node = self.node.id(), "{}", e);
            }
            Err(e) => {
                warn!(node = self.node.id(), from = self.arrived_from, "flood handler failed: {}", e);
            }
        }
    }

    pub async fn process(&self, message: Message) -> Result<FloodOutcome> {
        let stats = self.node.stats_counters();
        stats.record_received();

        let mut state = self.node.lock_state().await;
        state.note_delivery(Instant::now());

        if message.kind() != MessageKind::Broadcast {
            stats.record_violation();
            return Err(Error::ProtocolViolation {
                kind: message.kind(),
                from: self.arrived_from,
            });
        }

        let outcome = flood(&mut state, &message, self.arrived_from);

        match &outcome {
            FloodOutcome::Accepted { forward_to } => {
                stats.record_accepted();
                debug!(
                    node = self.node.id(),
                    source = message.source(),
                    sequence = message.sequence(),
                    from = self.arrived_from,
                    "accepted link-state, forwarding to {:?}",
                    forward_to
                );
                self.node.notify_progress();
                // Forwarding stays inside the critical section.
                self.node.send_all(&message, forward_to).await;
            }
            FloodOutcome::Stale { .. } => stats.record_stale(),
        }

        drop(state);
        Ok(outcome)
    }
}
