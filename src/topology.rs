//! Topology files.
//!
//! ```text
//! 3
//! 1 2 5 7012 7021 3 7 7013 7031
//! 2 1 5 7021 7012 3 3 7023 7032
//! 3 1 7 7031 7013 2 3 7032 7023
//! stop
//! start
//! update 1 3 9
//! start
//! ```
//!
//! A node line is `id (neighbor weight sendPort listenPort)*`, where
//! `listenPort` is where `id` listens for `neighbor` and `sendPort` is where
//! `neighbor` listens for `id`.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::NodeId;
use crate::error::{ConfigError, Result};
use crate::network::{Link, LinkTable};

const STOP_MARKER: &str = "stop";

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Update { a: NodeId, b: NodeId, weight: f64 },
    Start,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    node_count: usize,
    links: Vec<LinkTable>,
    directives: Vec<Directive>,
}

impl Topology {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content)?)
    }

    pub fn parse(input: &str) -> std::result::Result<Self, ConfigError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (line_no, first) = lines.next().ok_or(ConfigError::Empty)?;
        let node_count: usize = first.parse().map_err(|_| ConfigError::Malformed {
            line: line_no,
            reason: format!("expected node count, found {:?}", first),
        })?;
        if node_count == 0 {
            return Err(ConfigError::Empty);
        }

        // Sized by what the file declares, not by the claimed count.
        let mut declared: BTreeMap<NodeId, LinkTable> = BTreeMap::new();
        let mut directives = Vec::new();
        let mut in_nodes = true;

        for (line_no, line) in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let head = tokens[0];

            if in_nodes && head == STOP_MARKER {
                in_nodes = false;
                continue;
            }
            if in_nodes && !is_directive(head) {
                let (id, links) = parse_node_line(&tokens, line_no, node_count)?;
                if declared.insert(id, links).is_some() {
                    return Err(ConfigError::DuplicateNode { line: line_no, id });
                }
                continue;
            }

            in_nodes = false;
            directives.push(parse_directive(&tokens, line_no, node_count)?);
        }

        if declared.len() != node_count {
            // ids are in 1..=node_count, so a gap exists within the declared prefix
            let missing = (1..=declared.len() + 1)
                .find(|id| !declared.contains_key(id))
                .unwrap_or(declared.len() + 1);
            return Err(ConfigError::MissingNode(missing));
        }
        let links: Vec<LinkTable> = declared.into_values().collect();

        let topology = Self {
            node_count,
            links,
            directives,
        };
        topology.validate()?;
        Ok(topology)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn links(&self, id: NodeId) -> Option<&LinkTable> {
        self.links.get(id.wrapping_sub(1))
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn edge_count(&self) -> usize {
        self.links.iter().map(LinkTable::len).sum::<usize>() / 2
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LinkTable)> {
        self.links.iter().enumerate().map(|(i, table)| (i + 1, table))
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (a, table) in self.nodes() {
            for (b, link) in table.iter() {
                let back = self
                    .links(b)
                    .and_then(|t| t.get(a))
                    .ok_or(ConfigError::AsymmetricLink { a, b })?;
                if back.weight != link.weight {
                    return Err(ConfigError::AsymmetricLink { a, b });
                }
                if back.listen_port != link.send_port || back.send_port != link.listen_port {
                    return Err(ConfigError::PortMismatch { a, b });
                }
            }
        }

        for directive in &self.directives {
            if let Directive::Update { a, b, .. } = *directive {
                if !self.links(a).is_some_and(|t| t.contains(b)) {
                    return Err(ConfigError::UnknownLink { a, b });
                }
            }
        }

        self.check_connected()
    }

    fn check_connected(&self) -> std::result::Result<(), ConfigError> {
        let mut reached = vec![false; self.node_count];
        let mut queue = VecDeque::from([1]);
        reached[0] = true;

        while let Some(id) = queue.pop_front() {
            for neighbor in self.links[id - 1].neighbors() {
                if !reached[neighbor - 1] {
                    reached[neighbor - 1] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        match reached.iter().position(|r| !r) {
            Some(i) => Err(ConfigError::Disconnected(i + 1)),
            None => Ok(()),
        }
    }
}

impl FromStr for Topology {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_directive(head: &str) -> bool {
    matches!(head, "start" | "update")
}

fn parse_node_line(
    tokens: &[&str],
    line: usize,
    node_count: usize,
) -> std::result::Result<(NodeId, LinkTable), ConfigError> {
    let id = parse_id(tokens[0], line, node_count)?;
    let rest = &tokens[1..];
    if rest.len() % 4 != 0 {
        return Err(ConfigError::Malformed {
            line,
            reason: "neighbor entries are `neighbor weight sendPort listenPort`".to_string(),
        });
    }

    let mut links = LinkTable::new();
    for entry in rest.chunks(4) {
        let neighbor = parse_id(entry[0], line, node_count)?;
        if neighbor == id {
            return Err(ConfigError::Malformed {
                line,
                reason: format!("node {} lists itself as a neighbor", id),
            });
        }
        let link = Link {
            weight: parse_weight(entry[1], line, id, neighbor)?,
            send_port: parse_port(entry[2], line)?,
            listen_port: parse_port(entry[3], line)?,
        };
        if links.insert(neighbor, link).is_some() {
            return Err(ConfigError::Malformed {
                line,
                reason: format!("neighbor {} listed twice", neighbor),
            });
        }
    }

    Ok((id, links))
}

fn parse_directive(
    tokens: &[&str],
    line: usize,
    node_count: usize,
) -> std::result::Result<Directive, ConfigError> {
    match tokens {
        ["start"] => Ok(Directive::Start),
        ["update", a, b, weight] => {
            let a = parse_id(a, line, node_count)?;
            let b = parse_id(b, line, node_count)?;
            let weight = parse_weight(weight, line, a, b)?;
            Ok(Directive::Update { a, b, weight })
        }
        _ => Err(ConfigError::Malformed {
            line,
            reason: format!("unrecognized directive {:?}", tokens.join(" ")),
        }),
    }
}

fn parse_id(token: &str, line: usize, count: usize) -> std::result::Result<NodeId, ConfigError> {
    let id: usize = token.parse().map_err(|_| ConfigError::Malformed {
        line,
        reason: format!("expected node id, found {:?}", token),
    })?;
    if id == 0 || id > count {
        return Err(ConfigError::IdOutOfRange { line, id, count });
    }
    Ok(id)
}

fn parse_weight(
    token: &str,
    line: usize,
    a: NodeId,
    b: NodeId,
) -> std::result::Result<f64, ConfigError> {
    let weight: f64 = token.parse().map_err(|_| ConfigError::Malformed {
        line,
        reason: format!("expected weight, found {:?}", token),
    })?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(ConfigError::InvalidWeight { a, b, weight });
    }
    Ok(weight)
}

fn parse_port(token: &str, line: usize) -> std::result::Result<u16, ConfigError> {
    token.parse().map_err(|_| ConfigError::Malformed {
        line,
        reason: format!("expected port, found {:?}", token),
    })
}
