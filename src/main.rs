use anyhow::Result;
use clap::Parser;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Builder;
use tracing::error;
use tracing_subscriber::EnvFilter;

use link_state_routing::{Driver, NodeId, SimulationConfig};

#[derive(Parser)]
#[command(name = "lsr-sim", about = "Link-state routing over loopback TCP")]
struct Cli {
    /// Topology files, run one after another.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// JSON simulation config.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<IpAddr>,

    /// Always print this node's matrix instead of a random one.
    #[arg(long)]
    node: Option<NodeId>,

    /// Convergence timeout per round; 0 waits forever.
    #[arg(long)]
    round_timeout_ms: Option<u64>,

    /// Seed for the random node choice.
    #[arg(long)]
    seed: Option<u64>,

    /// Also print shortest paths from the reported node.
    #[arg(long)]
    paths: bool,
}

impl Cli {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(node) = self.node {
            config.report_node = Some(node);
        }
        if let Some(ms) = self.round_timeout_ms {
            config.convergence_timeout_ms = (ms > 0).then_some(ms);
        }
        Ok(config)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.simulation_config()?;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let failures = rt.block_on(async {
        let mut driver = Driver::new(config, io::stdout()).with_paths(cli.paths);
        if let Some(seed) = cli.seed {
            driver = driver.with_seed(seed);
        }

        let mut failures = 0;
        for path in &cli.files {
            if let Err(e) = driver.run_file(path).await {
                error!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
        failures
    });

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
