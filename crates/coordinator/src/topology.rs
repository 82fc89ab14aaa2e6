//! Topology-file parsing.
//!
//! A topology is a whitespace-separated stream of `u v cost` triples; line
//! breaks and extra spacing are irrelevant. Each triple installs one
//! undirected edge. Duplicate triples are permitted (seeding folds them
//! idempotently); self-loops are not.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use dvsim_primitives::{COORDINATOR_ID, Cost, INF, MAX_ROUTERS, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to read topology file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{token}` is not a valid {expected}")]
    BadToken {
        token: String,
        expected: &'static str,
    },
    #[error("incomplete trailing triple; topology entries are `u v cost`")]
    TruncatedTriple,
    #[error("self-loop on node {0}; an edge must join two distinct nodes")]
    SelfLoop(NodeId),
    #[error("edge cost {0} is at or beyond the unreachable sentinel")]
    UnboundedCost(Cost),
    #[error("node {0} uses the identifier reserved for the coordinator")]
    ReservedId(NodeId),
    #[error("topology names more than {limit} distinct nodes")]
    TooManyNodes { limit: usize },
}

/// One undirected edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub u: NodeId,
    pub v: NodeId,
    pub cost: Cost,
}

/// The static network graph the run simulates.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    edges: Vec<Edge>,
    nodes: BTreeSet<NodeId>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses a topology file.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let input = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input)
    }

    /// Parses the whitespace-separated triple stream.
    pub fn parse(input: &str) -> Result<Self, TopologyError> {
        let mut topology = Self::new();
        let mut tokens = input.split_whitespace();
        while let Some(first) = tokens.next() {
            let second = tokens.next().ok_or(TopologyError::TruncatedTriple)?;
            let third = tokens.next().ok_or(TopologyError::TruncatedTriple)?;
            let u = parse_node(first)?;
            let v = parse_node(second)?;
            let cost = third.parse().map_err(|_| TopologyError::BadToken {
                token: third.to_owned(),
                expected: "edge cost",
            })?;
            topology.add_edge(u, v, cost)?;
        }
        Ok(topology)
    }

    /// Adds an isolated node (a router with no edges).
    pub fn add_node(&mut self, id: NodeId) -> Result<(), TopologyError> {
        if id == COORDINATOR_ID {
            return Err(TopologyError::ReservedId(id));
        }
        self.nodes.insert(id);
        if self.nodes.len() > MAX_ROUTERS {
            return Err(TopologyError::TooManyNodes { limit: MAX_ROUTERS });
        }
        Ok(())
    }

    /// Adds one undirected edge, registering both endpoints.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId, cost: Cost) -> Result<(), TopologyError> {
        if u == v {
            return Err(TopologyError::SelfLoop(u));
        }
        if cost >= INF {
            return Err(TopologyError::UnboundedCost(cost));
        }
        self.add_node(u)?;
        self.add_node(v)?;
        self.edges.push(Edge { u, v, cost });
        Ok(())
    }

    /// Distinct node identifiers, ascending.
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

fn parse_node(token: &str) -> Result<NodeId, TopologyError> {
    let id = token.parse().map_err(|_| TopologyError::BadToken {
        token: token.to_owned(),
        expected: "node identifier",
    })?;
    if id == COORDINATOR_ID {
        return Err(TopologyError::ReservedId(id));
    }
    Ok(id)
}
