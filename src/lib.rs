pub mod algorithms;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod network;
pub mod node;
pub mod protocol;
pub mod sync;
pub mod topology;

pub use config::SimulationConfig;
pub use coordinator::Network;
pub use driver::Driver;
pub use error::{ConfigError, Error, Result};
pub use node::{AdjacencyMatrix, Node, NodeStatus};
pub use topology::{Directive, Topology};

/// Node identity, `1..=N`.
pub type NodeId = usize;
