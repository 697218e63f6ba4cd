use std::fmt;
use std::time::Instant;

use crate::NodeId;
use crate::network::LinkTable;
use crate::protocol::{Edge, LinkState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Idle,
    Listening,
    Broadcasting,
    Converging,
    Done,
}

/// N x N weights indexed by node id (1-based). `None` means no known link.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    weights: Vec<Vec<Option<f64>>>,
}

impl AdjacencyMatrix {
    pub fn new(node_count: usize) -> Self {
        Self {
            weights: vec![vec![None; node_count]; node_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.weights.len()
    }

    pub fn get(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.weights
            .get(a.wrapping_sub(1))
            .and_then(|row| row.get(b.wrapping_sub(1)))
            .copied()
            .flatten()
    }

    /// Writes both `m[a][b]` and `m[b][a]`. Ids outside 1..=N are ignored.
    pub fn set(&mut self, edge: Edge, weight: f64) {
        let (a, b) = edge.endpoints();
        let n = self.node_count();
        if a == 0 || b == 0 || a > n || b > n {
            return;
        }
        self.weights[a - 1][b - 1] = Some(weight);
        self.weights[b - 1][a - 1] = Some(weight);
    }

    pub fn apply(&mut self, link_states: &[LinkState]) {
        for state in link_states {
            self.set(state.edge, state.weight);
        }
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.node_count();
        (0..n).all(|i| (0..n).all(|j| self.weights[i][j] == self.weights[j][i]))
    }
}

impl fmt::Display for AdjacencyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.weights {
            let cells: Vec<String> = row
                .iter()
                .map(|w| w.unwrap_or(-1.0).to_string())
                .collect();
            writeln!(f, "{}", cells.join(", "))?;
        }
        Ok(())
    }
}

/// Highest sequence number seen per source. Entries only ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTable {
    seen: Vec<u64>,
}

impl SequenceTable {
    pub fn new(node_count: usize) -> Self {
        Self {
            seen: vec![0; node_count],
        }
    }

    pub fn get(&self, source: NodeId) -> Option<u64> {
        self.seen.get(source.wrapping_sub(1)).copied()
    }

    /// Records `sequence` for `source` if it is newer. Returns whether it was.
    pub fn observe(&mut self, source: NodeId, sequence: u64) -> bool {
        match self.seen.get_mut(source.wrapping_sub(1)) {
            Some(entry) if sequence > *entry => {
                *entry = sequence;
                true
            }
            _ => false,
        }
    }

    pub fn all_reached(&self, round: u64) -> bool {
        self.seen.iter().all(|&s| s >= round)
    }
}

/// When the node's listeners finished binding and when its first message
/// reached a handler, for the current listening period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenTimeline {
    pub bound_at: Option<Instant>,
    pub first_delivery: Option<Instant>,
}

/// Everything a node mutates during a round, guarded by the node's lock.
#[derive(Debug)]
pub struct NodeState {
    id: NodeId,
    round: u64,
    status: NodeStatus,
    timeline: ListenTimeline,
    links: LinkTable,
    matrix: AdjacencyMatrix,
    sequence: SequenceTable,
}

impl NodeState {
    /// The matrix starts out knowing this node's own links.
    pub fn new(id: NodeId, node_count: usize, links: LinkTable) -> Self {
        let mut matrix = AdjacencyMatrix::new(node_count);
        for (neighbor, link) in links.iter() {
            matrix.set(Edge::new(id, neighbor), link.weight);
        }

        Self {
            id,
            round: 0,
            status: NodeStatus::Idle,
            timeline: ListenTimeline::default(),
            links,
            matrix,
            sequence: SequenceTable::new(node_count),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub fn timeline(&self) -> ListenTimeline {
        self.timeline
    }

    /// Every listener is bound; starts a new listening period.
    pub fn mark_listening(&mut self, at: Instant) {
        self.status = NodeStatus::Listening;
        self.timeline = ListenTimeline {
            bound_at: Some(at),
            first_delivery: None,
        };
    }

    pub fn note_delivery(&mut self, at: Instant) {
        self.timeline.first_delivery.get_or_insert(at);
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn matrix(&self) -> &AdjacencyMatrix {
        &self.matrix
    }

    pub fn sequence(&self) -> &SequenceTable {
        &self.sequence
    }

    pub(crate) fn sequence_mut(&mut self) -> &mut SequenceTable {
        &mut self.sequence
    }

    /// Applies flooded facts to the matrix. Facts about this node's own
    /// edges also refresh the link table.
    pub fn apply_link_states(&mut self, link_states: &[LinkState]) {
        self.matrix.apply(link_states);
        for state in link_states {
            let (a, b) = state.edge.endpoints();
            let neighbor = match (a == self.id, b == self.id) {
                (true, _) => b,
                (_, true) => a,
                _ => continue,
            };
            self.links.set_weight(neighbor, state.weight);
        }
    }

    /// Starts the next round and returns its number.
    pub fn begin_round(&mut self) -> u64 {
        self.round += 1;
        self.sequence.observe(self.id, self.round);
        self.status = NodeStatus::Broadcasting;
        self.round
    }

    pub fn local_link_states(&self) -> Vec<LinkState> {
        self.links
            .iter()
            .map(|(neighbor, link)| LinkState::new(self.id, neighbor, link.weight))
            .collect()
    }

    /// Updates the link weight and this node's view of it. Returns false
    /// when `neighbor` is not adjacent.
    pub fn set_link_weight(&mut self, neighbor: NodeId, weight: f64) -> bool {
        if !self.links.set_weight(neighbor, weight) {
            return false;
        }
        self.matrix.set(Edge::new(self.id, neighbor), weight);
        true
    }

    pub fn is_converged(&self) -> bool {
        self.sequence.all_reached(self.round)
    }
}
