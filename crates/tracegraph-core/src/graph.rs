//! Materialized service graph
//!
//! A read-optimized projection of the service registry and dependency table:
//! an arena of nodes addressed by index, an edge list, and per-node
//! adjacency vectors. Ingestion never mutates a published graph; the builder
//! patches its private copy and hands out `Arc` snapshots.

use crate::model::{ServiceEdge, ServiceNode};
use std::collections::HashMap;

/// Index of a node in the arena
pub type NodeId = usize;

/// Index of an edge in the edge list
pub type EdgeId = usize;

/// An edge of the materialized graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,

    /// Path-algorithm weight, equal to the call count
    pub weight: u64,

    /// Snapshot of the dependency-table entry
    pub stats: ServiceEdge,
}

/// Directed graph of services
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    version: u64,
    nodes: Vec<ServiceNode>,
    index: HashMap<String, NodeId>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(NodeId, NodeId), EdgeId>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl ServiceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from scratch. Nodes and edges are laid out in name order.
    pub fn rebuild<'a>(
        nodes: impl IntoIterator<Item = &'a ServiceNode>,
        edges: impl IntoIterator<Item = &'a ServiceEdge>,
    ) -> Self {
        let mut nodes: Vec<&ServiceNode> = nodes.into_iter().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        let mut edges: Vec<&ServiceEdge> = edges.into_iter().collect();
        edges.sort_by(|a, b| (&a.caller, &a.callee).cmp(&(&b.caller, &b.callee)));

        let mut graph = Self::new();
        for node in nodes {
            graph.upsert_node(node);
        }
        for edge in edges {
            graph.upsert_edge(edge);
        }
        graph
    }

    /// Insert a node or replace its attributes
    pub fn upsert_node(&mut self, node: &ServiceNode) -> NodeId {
        if let Some(&id) = self.index.get(&node.name) {
            self.nodes[id] = node.clone();
            return id;
        }

        let id = self.nodes.len();
        self.nodes.push(node.clone());
        self.index.insert(node.name.clone(), id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Insert an edge or replace its attributes.
    ///
    /// Both endpoints must already be present; a missing endpoint means the
    /// builder broke its own invariant.
    pub fn upsert_edge(&mut self, edge: &ServiceEdge) -> EdgeId {
        let from = self.endpoint(&edge.caller);
        let to = self.endpoint(&edge.callee);

        if let Some(&id) = self.edge_index.get(&(from, to)) {
            let existing = &mut self.edges[id];
            existing.weight = edge.call_count;
            existing.stats = edge.clone();
            return id;
        }

        let id = self.edges.len();
        self.edges.push(GraphEdge {
            from,
            to,
            weight: edge.call_count,
            stats: edge.clone(),
        });
        self.edge_index.insert((from, to), id);
        self.outgoing[from].push(id);
        self.incoming[to].push(id);
        id
    }

    fn endpoint(&self, name: &str) -> NodeId {
        match self.index.get(name) {
            Some(&id) => id,
            None => panic!("edge endpoint `{name}` missing from the service graph"),
        }
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Publication counter; increases with every applied trace
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.node_id(name).map(|id| &self.nodes[id])
    }

    pub fn node_at(&self, id: NodeId) -> &ServiceNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }

    pub fn edge(&self, caller: &str, callee: &str) -> Option<&GraphEdge> {
        let key = (self.node_id(caller)?, self.node_id(callee)?);
        self.edge_index.get(&key).map(|&id| &self.edges[id])
    }

    /// Edges leaving `id`
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.outgoing[id].iter().map(|&e| &self.edges[e])
    }

    /// Edges entering `id`
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.incoming[id].iter().map(|&e| &self.edges[e])
    }

    /// Total calls and errors across every service
    pub fn totals(&self) -> (u64, u64) {
        self.nodes.iter().fold((0, 0), |(calls, errors), node| {
            (calls + node.call_count, errors + node.error_count)
        })
    }

    /// Same nodes and edges irrespective of arena layout
    pub fn same_contents(&self, other: &ServiceGraph) -> bool {
        if self.node_count() != other.node_count() || self.edge_count() != other.edge_count() {
            return false;
        }
        let nodes_match = self
            .nodes
            .iter()
            .all(|node| other.node(&node.name) == Some(node));
        let edges_match = self.edges.iter().all(|edge| {
            other
                .edge(&edge.stats.caller, &edge.stats.callee)
                .is_some_and(|o| o.weight == edge.weight && o.stats == edge.stats)
        });
        nodes_match && edges_match
    }
}
