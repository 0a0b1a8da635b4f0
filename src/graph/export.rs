//! Graph export functionality.
//!
//! This module provides functions to export the dependency graph
//! in various formats for visualization and analysis.

use crate::error::Result;
use crate::graph::types::DependencyGraph;
use crate::types::{EdgeKind, GraphFormat};
use serde::Serialize;

/// Export the dependency graph to the specified format.
///
/// # Supported Formats
///
/// - **DOT**: Graphviz DOT format for visualization
/// - **JSON**: Structured JSON for programmatic access
/// - **Mermaid**: Mermaid diagram syntax for documentation
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_graph(graph: &DependencyGraph, format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Dot => export_dot(graph),
        GraphFormat::Json => export_json(graph),
        GraphFormat::Mermaid => export_mermaid(graph),
    }
}

/// Export to Graphviz DOT format.
fn export_dot(graph: &DependencyGraph) -> Result<String> {
    let mut dot = String::new();
    dot.push_str("digraph Terracarta {\n");
    dot.push_str("    rankdir=TB;\n");
    dot.push_str("    node [shape=box, style=rounded];\n");
    dot.push_str("    \n");

    for node in graph.nodes() {
        let node_id = escape_dot_id(&node.address);
        let fill = match node.kind.as_str() {
            "module" => "lightblue",
            "variable" | "output" | "locals" => "lightyellow",
            "data" => "lightgreen",
            _ => "white",
        };
        dot.push_str(&format!(
            "    \"{node_id}\" [label=\"{}\\n{}\", fillcolor={fill}, style=\"rounded,filled\"];\n",
            escape_dot_string(&node.address),
            node.kind,
        ));
    }
    dot.push('\n');

    for (from, to, edge) in graph.edges() {
        let from_id = escape_dot_id(&from.address);
        let to_id = escape_dot_id(&to.address);
        let style = match edge.kind {
            EdgeKind::Reference => "style=solid, color=blue",
            EdgeKind::Contains => "style=dashed, color=gray",
        };
        dot.push_str(&format!(
            "    \"{from_id}\" -> \"{to_id}\" [{style}, label=\"{}\"];\n",
            edge.reference
        ));
    }

    dot.push_str("}\n");
    Ok(dot)
}

/// Export to JSON format.
fn export_json(graph: &DependencyGraph) -> Result<String> {
    #[derive(Serialize)]
    struct JsonGraph {
        nodes: Vec<JsonNode>,
        edges: Vec<JsonEdge>,
        metadata: JsonMetadata,
    }

    #[derive(Serialize)]
    struct JsonNode {
        address: String,
        #[serde(rename = "type")]
        kind: String,
        file: String,
    }

    #[derive(Serialize)]
    struct JsonEdge {
        from: String,
        to: String,
        #[serde(rename = "type")]
        edge_kind: String,
        reference: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    }

    #[derive(Serialize)]
    struct JsonMetadata {
        total_nodes: usize,
        total_edges: usize,
    }

    let nodes: Vec<JsonNode> = graph
        .nodes()
        .map(|n| JsonNode {
            address: n.address.clone(),
            kind: n.kind.clone(),
            file: n.file.to_string_lossy().to_string(),
        })
        .collect();

    let edges: Vec<JsonEdge> = graph
        .edges()
        .map(|(from, to, edge)| JsonEdge {
            from: from.address.clone(),
            to: to.address.clone(),
            edge_kind: edge.kind.to_string(),
            reference: edge.reference.to_string(),
            attribute: edge.attribute.clone(),
        })
        .collect();

    let doc = JsonGraph {
        metadata: JsonMetadata {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
        },
        nodes,
        edges,
    };

    serde_json::to_string_pretty(&doc).map_err(|e| crate::err!(GraphExport {
        message: e.to_string(),
    }))
}

/// Export to Mermaid diagram syntax.
fn export_mermaid(graph: &DependencyGraph) -> Result<String> {
    let mut mermaid = String::new();
    mermaid.push_str("graph TD\n");

    for node in graph.nodes() {
        let id = mermaid_id(&node.address);
        mermaid.push_str(&format!("    {id}[\"{}\"]\n", node.address));
    }
    mermaid.push('\n');

    for (from, to, edge) in graph.edges() {
        let from_id = mermaid_id(&from.address);
        let to_id = mermaid_id(&to.address);
        let arrow = match edge.kind {
            EdgeKind::Reference => "-->",
            EdgeKind::Contains => "-.->",
        };
        mermaid.push_str(&format!(
            "    {from_id} {arrow}|{}| {to_id}\n",
            edge.reference
        ));
    }

    Ok(mermaid)
}

/// Escape a string for use inside a DOT label.
fn escape_dot_string(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Escape an identifier for use as a DOT node ID.
fn escape_dot_id(s: &str) -> String {
    s.replace('"', "_")
}

/// Make a Mermaid-safe node identifier.
fn mermaid_id(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Block, BlockKind, Edge, ProjectIndex, ReferenceKind, TextRange};
    use std::path::PathBuf;

    fn sample_graph() -> DependencyGraph {
        let mut index = ProjectIndex::new();
        index.blocks = vec![
            Block {
                kind: BlockKind::Resource,
                resource_type: Some("aws_vpc".to_string()),
                name: Some("main".to_string()),
                provider: Some("aws".to_string()),
                module_path: Vec::new(),
                source: None,
                file: PathBuf::from("/p/main.tf"),
                range: TextRange::new(0, 10),
            },
            Block {
                kind: BlockKind::Resource,
                resource_type: Some("aws_subnet".to_string()),
                name: Some("public".to_string()),
                provider: Some("aws".to_string()),
                module_path: Vec::new(),
                source: None,
                file: PathBuf::from("/p/main.tf"),
                range: TextRange::new(11, 30),
            },
        ];
        index.rebuild_maps();
        index.refs = Some(vec![Edge {
            from: "aws_subnet.public".to_string(),
            to: "aws_vpc.main".to_string(),
            kind: EdgeKind::Reference,
            reference: ReferenceKind::Resource,
            attribute: Some("id".to_string()),
        }]);
        DependencyGraph::from_index(&index)
    }

    #[test]
    fn test_export_dot() {
        let dot = export_graph(&sample_graph(), GraphFormat::Dot).unwrap();
        assert!(dot.contains("digraph"));
        assert!(dot.contains("aws_vpc.main"));
        assert!(dot.contains("->"));
    }

    #[test]
    fn test_export_json() {
        let json = export_graph(&sample_graph(), GraphFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["metadata"]["total_nodes"], 2);
        assert_eq!(parsed["metadata"]["total_edges"], 1);
        assert_eq!(parsed["edges"][0]["reference"], "resource");
        assert_eq!(parsed["edges"][0]["attribute"], "id");
    }

    #[test]
    fn test_export_mermaid() {
        let mermaid = export_graph(&sample_graph(), GraphFormat::Mermaid).unwrap();
        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("-->"));
    }
}
