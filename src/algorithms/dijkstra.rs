use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::NodeId;
use crate::node::AdjacencyMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPath {
    pub cost: f64,
    pub next_hop: Option<NodeId>,
    pub path: Vec<NodeId>,
}

#[derive(Debug)]
struct State {
    cost: f64,
    node: NodeId,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest paths from `source` over a converged matrix. Entry `i` holds the
/// path to node `i + 1`, `None` when unreachable or out of range.
pub fn shortest_paths(matrix: &AdjacencyMatrix, source: NodeId) -> Vec<Option<ShortestPath>> {
    let n = matrix.node_count();
    if source == 0 || source > n {
        return vec![None; n];
    }

    let mut distances = vec![f64::INFINITY; n];
    let mut previous: Vec<Option<NodeId>> = vec![None; n];
    let mut heap = BinaryHeap::new();

    distances[source - 1] = 0.0;
    heap.push(State {
        cost: 0.0,
        node: source,
    });

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > distances[node - 1] {
            continue;
        }

        for neighbor in 1..=n {
            let Some(weight) = matrix.get(node, neighbor) else {
                continue;
            };
            if neighbor == node {
                continue;
            }

            let next = cost + weight;
            if next < distances[neighbor - 1] {
                distances[neighbor - 1] = next;
                previous[neighbor - 1] = Some(node);
                heap.push(State {
                    cost: next,
                    node: neighbor,
                });
            }
        }
    }

    (1..=n)
        .map(|dest| {
            let cost = distances[dest - 1];
            if !cost.is_finite() {
                return None;
            }
            let path = reconstruct_path(&previous, dest);
            Some(ShortestPath {
                cost,
                next_hop: path.get(1).copied(),
                path,
            })
        })
        .collect()
}

fn reconstruct_path(previous: &[Option<NodeId>], dest: NodeId) -> Vec<NodeId> {
    let mut path = vec![dest];
    let mut current = dest;

    while let Some(prev) = previous[current - 1] {
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}
