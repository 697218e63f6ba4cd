use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::NodeId;
use crate::config::SimulationConfig;
use crate::error::{ConfigError, Error, Result};
use crate::node::Node;
use crate::sync::CountdownLatch;
use crate::topology::Topology;

/// Owns every node and drives rounds through three phases:
///
/// 1. every node binds its neighbor listeners; nobody broadcasts until all
///    listeners in the network are bound,
/// 2. every node runs its round in its own task; wait for all of them to
///    signal convergence and for the tasks to finish,
/// 3. every node closes its listeners and reaps its flood handlers.
///
/// Edge weights are only mutated between rounds; `&mut self` on both
/// [`update_edge`](Self::update_edge) and [`run_round`](Self::run_round)
/// makes a concurrent update impossible.
pub struct Network {
    nodes: Vec<Arc<Node>>,
    round: u64,
}

impl Network {
    pub fn from_topology(topology: &Topology, config: SimulationConfig) -> Self {
        let config = Arc::new(config);
        let node_count = topology.node_count();
        let nodes = topology
            .nodes()
            .map(|(id, links)| Arc::new(Node::new(id, node_count, links.clone(), config.clone())))
            .collect();

        Self { nodes, round: 0 }
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.nodes.get(id.wrapping_sub(1))
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rounds completed or attempted so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Sets the weight of link `a`-`b` on both endpoints.
    pub async fn update_edge(&mut self, a: NodeId, b: NodeId, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::InvalidWeight { a, b, weight }.into());
        }
        let unknown = || Error::from(ConfigError::UnknownLink { a, b });
        let (node_a, node_b) = match (self.node(a), self.node(b)) {
            (Some(x), Some(y)) if a != b => (x, y),
            _ => return Err(unknown()),
        };
        if !node_a.links().await.contains(b) {
            return Err(unknown());
        }

        node_a.update_weight(b, weight).await?;
        node_b.update_weight(a, weight).await?;
        info!(a, b, weight, "edge updated");
        Ok(())
    }

    pub async fn run_round(&mut self) -> Result<()> {
        self.round += 1;
        let round = self.round;

        info!(round, "phase 1: starting listeners");
        if let Err(e) = self.start_listening().await {
            error!(round, "listener setup failed: {}", e);
            self.stop_listening().await;
            return Err(e);
        }

        info!(round, "phase 2: broadcasting");
        let outcome = self.broadcast_and_converge().await;

        info!(round, "phase 3: closing listeners");
        self.stop_listening().await;

        match &outcome {
            Ok(()) => info!(round, "round complete"),
            Err(e) => error!(round, "round failed: {}", e),
        }
        outcome
    }

    /// Runs phase 3 if anything is still listening. Idempotent.
    pub async fn terminate(&mut self) {
        self.stop_listening().await;
    }

    async fn start_listening(&self) -> Result<()> {
        let expected = self.nodes.iter().map(|node| node.degree()).sum();
        let ready = CountdownLatch::new(expected);

        for node in &self.nodes {
            node.start_listeners(&ready).await?;
        }
        ready.wait().await;
        Ok(())
    }

    async fn broadcast_and_converge(&self) -> Result<()> {
        let done = CountdownLatch::new(self.nodes.len());
        let tasks: Vec<_> = self
            .nodes
            .iter()
            .map(|node| tokio::spawn(node.clone().run_round(done.clone())))
            .collect();

        done.wait().await;

        let mut failure = None;
        for task in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::Task(e)),
            };
            if let Err(e) = result {
                error!("{}", e);
                failure.get_or_insert(e);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    async fn stop_listening(&self) {
        let teardown = CountdownLatch::new(self.nodes.len());
        join_all(self.nodes.iter().map(|node| node.close_listeners(&teardown))).await;
        teardown.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Network {
        let topology = Topology::parse("2\n1 2 4 9012 9021\n2 1 4 9021 9012\n").unwrap();
        Network::from_topology(&topology, SimulationConfig::default())
    }

    #[tokio::test]
    async fn test_update_edge_is_symmetric() {
        let mut network = pair();
        network.update_edge(2, 1, 6.5).await.unwrap();

        for node in network.nodes() {
            let matrix = node.matrix().await;
            assert_eq!(matrix.get(1, 2), Some(6.5));
            assert_eq!(matrix.get(2, 1), Some(6.5));
        }
        assert_eq!(network.node(1).unwrap().links().await.get(2).unwrap().weight, 6.5);
    }

    #[tokio::test]
    async fn test_update_edge_rejects_bad_input() {
        let mut network = pair();
        assert!(matches!(
            network.update_edge(1, 3, 1.0).await,
            Err(Error::Config(ConfigError::UnknownLink { a: 1, b: 3 }))
        ));
        assert!(matches!(
            network.update_edge(1, 1, 1.0).await,
            Err(Error::Config(ConfigError::UnknownLink { .. }))
        ));
        assert!(matches!(
            network.update_edge(1, 2, f64::NAN).await,
            Err(Error::Config(ConfigError::InvalidWeight { .. }))
        ));
    }

    #[tokio::test]
    async fn test_terminate_without_round() {
        let mut network = pair();
        network.terminate().await;
        network.terminate().await;
        assert_eq!(network.round(), 0);
    }
}
