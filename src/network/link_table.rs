use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub weight: f64,
    /// Port the neighbor listens on for this node.
    pub send_port: u16,
    /// Port this node listens on for the neighbor.
    pub listen_port: u16,
}

impl Link {
    pub fn send_addr(&self, host: IpAddr) -> SocketAddr {
        SocketAddr::new(host, self.send_port)
    }

    pub fn listen_addr(&self, host: IpAddr) -> SocketAddr {
        SocketAddr::new(host, self.listen_port)
    }
}

/// Neighbor id -> link, owned by exactly one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkTable {
    links: BTreeMap<NodeId, Link>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous link to `neighbor`, if any.
    pub fn insert(&mut self, neighbor: NodeId, link: Link) -> Option<Link> {
        self.links.insert(neighbor, link)
    }

    pub fn get(&self, neighbor: NodeId) -> Option<&Link> {
        self.links.get(&neighbor)
    }

    pub fn contains(&self, neighbor: NodeId) -> bool {
        self.links.contains_key(&neighbor)
    }

    /// Returns false when `neighbor` is not adjacent.
    pub fn set_weight(&mut self, neighbor: NodeId, weight: f64) -> bool {
        match self.links.get_mut(&neighbor) {
            Some(link) => {
                link.weight = weight;
                true
            }
            None => false,
        }
    }

    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Link)> {
        self.links.iter().map(|(id, link)| (*id, link))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
