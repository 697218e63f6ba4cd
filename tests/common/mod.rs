#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::TcpListener;

use link_state_routing::{NodeId, SimulationConfig, Topology};

/// Ports the OS considers free right now.
pub fn free_ports(count: usize) -> Vec<u16> {
    let held: Vec<TcpListener> = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    held.iter().map(|l| l.local_addr().unwrap().port()).collect()
}

/// Renders a topology file for `edges` with fresh loopback ports.
pub fn topology_text(node_count: usize, edges: &[(NodeId, NodeId, f64)], directives: &[&str]) -> String {
    let ports = free_ports(edges.len() * 2);
    let mut lines: BTreeMap<NodeId, String> = (1..=node_count).map(|id| (id, id.to_string())).collect();

    for (i, &(a, b, weight)) in edges.iter().enumerate() {
        // a listens for b on `a_port`, b listens for a on `b_port`
        let (a_port, b_port) = (ports[2 * i], ports[2 * i + 1]);
        lines
            .get_mut(&a)
            .unwrap()
            .push_str(&format!(" {} {} {} {}", b, weight, b_port, a_port));
        lines
            .get_mut(&b)
            .unwrap()
            .push_str(&format!(" {} {} {} {}", a, weight, a_port, b_port));
    }

    let mut text = format!("{}\n", node_count);
    for line in lines.values() {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("stop\n");
    for directive in directives {
        text.push_str(directive);
        text.push('\n');
    }
    text
}

pub fn topology(node_count: usize, edges: &[(NodeId, NodeId, f64)], directives: &[&str]) -> Topology {
    Topology::parse(&topology_text(node_count, edges, directives)).unwrap()
}

pub fn config() -> SimulationConfig {
    SimulationConfig {
        convergence_timeout_ms: Some(10_000),
        ..Default::default()
    }
}

pub const TRIANGLE: &[(NodeId, NodeId, f64)] = &[(1, 2, 5.0), (1, 3, 7.0), (2, 3, 3.0)];
