//! Graph type definitions.
//!
//! Wraps a petgraph directed graph over the indexed blocks, keyed by their
//! fully qualified addresses, for traversal queries and export.

use crate::types::{Block, Edge, ProjectIndex};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// A node in the dependency graph: the display-relevant slice of a block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockNode {
    /// Fully qualified address (unique within a graph)
    pub address: String,
    /// Kind keyword
    pub kind: String,
    /// Defining file
    pub file: PathBuf,
}

/// The dependency graph over an indexed project.
///
/// Blocks are arena-stored in the underlying petgraph; a
/// `HashMap<address, NodeIndex>` provides O(1) lookup by address. Address
/// strings are the only identity: two builds of the same tree produce
/// interchangeable graphs even though every node object is new.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// The underlying petgraph directed graph
    inner: DiGraph<BlockNode, Edge>,

    /// Index from address to petgraph NodeIndex
    node_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph view over an index and its extracted edges.
    ///
    /// Edges whose endpoints are not in the index (possible after races
    /// between extraction and update) are skipped.
    #[must_use]
    pub fn from_index(index: &ProjectIndex) -> Self {
        let mut graph = Self::new();

        for block in &index.blocks {
            graph.add_block(block);
        }

        if let Some(refs) = &index.refs {
            for edge in refs {
                graph.add_edge(edge.clone());
            }
        }

        graph
    }

    /// Add a node for `block`. Returns its address; an existing node with
    /// the same address is reused.
    pub fn add_block(&mut self, block: &Block) -> String {
        let address = block.address();
        if self.node_index.contains_key(&address) {
            return address;
        }

        let idx = self.inner.add_node(BlockNode {
            address: address.clone(),
            kind: block.kind.as_str().to_string(),
            file: block.file.clone(),
        });
        self.node_index.insert(address.clone(), idx);
        address
    }

    /// Add an edge between two existing nodes.
    ///
    /// Returns false when either endpoint is unknown or an edge for the
    /// pair already exists.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let Some(&from_idx) = self.node_index.get(&edge.from) else {
            return false;
        };
        let Some(&to_idx) = self.node_index.get(&edge.to) else {
            return false;
        };

        if self.inner.find_edge(from_idx, to_idx).is_some() {
            return false;
        }

        self.inner.add_edge(from_idx, to_idx, edge);
        true
    }

    /// Get the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Get the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Addresses the given block depends on (outgoing edges).
    #[must_use]
    pub fn dependencies_of(&self, address: &str) -> Vec<&BlockNode> {
        self.neighbors(address, petgraph::Direction::Outgoing)
    }

    /// Addresses that depend on the given block (incoming edges).
    #[must_use]
    pub fn dependents_of(&self, address: &str) -> Vec<&BlockNode> {
        self.neighbors(address, petgraph::Direction::Incoming)
    }

    fn neighbors(&self, address: &str, direction: petgraph::Direction) -> Vec<&BlockNode> {
        let Some(&idx) = self.node_index.get(address) else {
            return Vec::new();
        };
        self.inner
            .neighbors_directed(idx, direction)
            .map(|neighbor| &self.inner[neighbor])
            .collect()
    }

    /// Get an iterator over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &BlockNode> {
        self.inner.node_weights()
    }

    /// Get an iterator over all edges with their endpoints.
    pub fn edges(&self) -> impl Iterator<Item = (&BlockNode, &BlockNode, &Edge)> {
        self.inner.edge_references().map(|edge| {
            (
                &self.inner[edge.source()],
                &self.inner[edge.target()],
                edge.weight(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockKind, EdgeKind, ReferenceKind, TextRange};

    fn block(kind: BlockKind, rtype: Option<&str>, name: &str) -> Block {
        Block {
            kind,
            resource_type: rtype.map(String::from),
            name: Some(name.to_string()),
            provider: rtype.and_then(Block::provider_hint),
            module_path: Vec::new(),
            source: None,
            file: PathBuf::from("/p/main.tf"),
            range: TextRange::new(0, 10),
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Reference,
            reference: ReferenceKind::Resource,
            attribute: None,
        }
    }

    #[test]
    fn test_from_index() {
        let mut index = ProjectIndex::new();
        index.blocks = vec![
            block(BlockKind::Resource, Some("aws_vpc"), "main"),
            block(BlockKind::Resource, Some("aws_subnet"), "public"),
        ];
        index.rebuild_maps();
        index.refs = Some(vec![edge("aws_subnet.public", "aws_vpc.main")]);

        let graph = DependencyGraph::from_index(&index);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        let deps = graph.dependencies_of("aws_subnet.public");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].address, "aws_vpc.main");

        let dependents = graph.dependents_of("aws_vpc.main");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].address, "aws_subnet.public");
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_block(&block(BlockKind::Resource, Some("aws_vpc"), "a"));
        graph.add_block(&block(BlockKind::Resource, Some("aws_vpc"), "b"));

        assert!(graph.add_edge(edge("aws_vpc.a", "aws_vpc.b")));
        assert!(!graph.add_edge(edge("aws_vpc.a", "aws_vpc.b")));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_block(&block(BlockKind::Resource, Some("aws_vpc"), "a"));
        assert!(!graph.add_edge(edge("aws_vpc.a", "aws_vpc.gone")));
    }

    #[test]
    fn test_unknown_address_queries_are_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.dependencies_of("nope").is_empty());
        assert!(graph.dependents_of("nope").is_empty());
    }
}
