use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::NodeId;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Address every node binds and connects on. All nodes share one host.
    pub host: IpAddr,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Upper bound on a node's convergence wait. `None` waits forever.
    pub convergence_timeout_ms: Option<u64>,
    /// How long a closing listener waits for its handlers before aborting them.
    pub handler_grace_ms: u64,
    /// Node whose matrix is printed after each round; random when unset.
    pub report_node: Option<NodeId>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout_ms: 1000,
            read_timeout_ms: 2000,
            convergence_timeout_ms: Some(30_000),
            handler_grace_ms: 1000,
            report_node: None,
        }
    }
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn convergence_timeout(&self) -> Option<Duration> {
        self.convergence_timeout_ms.map(Duration::from_millis)
    }

    pub fn handler_grace(&self) -> Duration {
        Duration::from_millis(self.handler_grace_ms)
    }
}
