use std::io::Write;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::NodeId;
use crate::algorithms::dijkstra::shortest_paths;
use crate::config::SimulationConfig;
use crate::coordinator::Network;
use crate::error::{Error, Result};
use crate::topology::{Directive, Topology};

/// Runs topology files and writes the reported matrices to `out`.
pub struct Driver<W: Write> {
    config: SimulationConfig,
    out: W,
    rng: StdRng,
    show_paths: bool,
}

impl<W: Write> Driver<W> {
    pub fn new(config: SimulationConfig, out: W) -> Self {
        Self {
            config,
            out,
            rng: StdRng::from_entropy(),
            show_paths: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_paths(mut self, show_paths: bool) -> Self {
        self.show_paths = show_paths;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub async fn run_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!("running {}", path.display());
        let topology = Topology::load(path)?;
        self.run_topology(&topology).await
    }

    /// Executes every directive in order. The network is always torn down,
    /// even when a directive fails.
    pub async fn run_topology(&mut self, topology: &Topology) -> Result<()> {
        let mut network = Network::from_topology(topology, self.config.clone());
        let result = self.execute(&mut network, topology.directives()).await;
        network.terminate().await;
        result
    }

    async fn execute(&mut self, network: &mut Network, directives: &[Directive]) -> Result<()> {
        for directive in directives {
            match *directive {
                Directive::Update { a, b, weight } => network.update_edge(a, b, weight).await?,
                Directive::Start => {
                    network.run_round().await?;
                    self.report(network).await?;
                }
            }
        }
        Ok(())
    }

    async fn report(&mut self, network: &Network) -> Result<()> {
        let id = self.pick_node(network.node_count());
        let node = network.node(id).ok_or(Error::UnknownNode(id))?;
        let matrix = node.matrix().await;

        write!(self.out, "{}", matrix)?;
        if self.show_paths {
            for (i, path) in shortest_paths(&matrix, id).iter().enumerate() {
                match path {
                    Some(path) => writeln!(self.out, "node {}: {} via {:?}", i + 1, path.cost, path.path)?,
                    None => writeln!(self.out, "node {}: unreachable", i + 1)?,
                }
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn pick_node(&mut self, node_count: usize) -> NodeId {
        match self.config.report_node {
            Some(id) => id,
            None => self.rng.gen_range(1..=node_count),
        }
    }
}
