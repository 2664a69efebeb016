//! Topology exporters for tracegraph
//!
//! Every renderer is a pure function of a graph snapshot. Nodes and edges are
//! emitted in name order so the same graph always renders the same text.

pub mod cytoscape;
pub mod dot;
pub mod mermaid;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracegraph_core::{GraphAnalyzer, GraphEdge, GraphEngine, ServiceGraph, ServiceNode};
use tracing::debug;

/// Export error type
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported export format: {0} (expected dot, cytoscape or mermaid)")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Graph rendering formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Dot,
    Cytoscape,
    Mermaid,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Dot => "dot",
            ExportFormat::Cytoscape => "cytoscape",
            ExportFormat::Mermaid => "mermaid",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" => Ok(ExportFormat::Dot),
            "cytoscape" => Ok(ExportFormat::Cytoscape),
            "mermaid" => Ok(ExportFormat::Mermaid),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Render `graph` in the given format
pub fn export(graph: &ServiceGraph, format: ExportFormat) -> ExportResult<String> {
    debug!(
        format = %format,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Exporting graph"
    );
    match format {
        ExportFormat::Dot => Ok(dot::render(graph)),
        ExportFormat::Cytoscape => cytoscape::render(graph),
        ExportFormat::Mermaid => Ok(mermaid::render(graph)),
    }
}

/// Serialize the topology document of `graph` as pretty JSON
pub fn export_topology_json(graph: &ServiceGraph) -> ExportResult<String> {
    let document = GraphAnalyzer::new(graph).service_mesh_topology();
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Export operations on anything holding a service graph
pub trait GraphExport {
    fn export(&self, format: ExportFormat) -> ExportResult<String>;

    fn export_topology_json(&self) -> ExportResult<String>;
}

impl GraphExport for ServiceGraph {
    fn export(&self, format: ExportFormat) -> ExportResult<String> {
        export(self, format)
    }

    fn export_topology_json(&self) -> ExportResult<String> {
        export_topology_json(self)
    }
}

impl GraphExport for GraphEngine {
    fn export(&self, format: ExportFormat) -> ExportResult<String> {
        export(&self.snapshot(), format)
    }

    // Uses the engine's analysis settings
    fn export_topology_json(&self) -> ExportResult<String> {
        let document = GraphEngine::export_topology_json(self);
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

pub(crate) fn sorted_nodes(graph: &ServiceGraph) -> Vec<&ServiceNode> {
    let mut nodes: Vec<&ServiceNode> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

pub(crate) fn sorted_edges(graph: &ServiceGraph) -> Vec<&GraphEdge> {
    let mut edges: Vec<&GraphEdge> = graph.edges().collect();
    edges.sort_by(|a, b| {
        a.stats
            .caller
            .cmp(&b.stats.caller)
            .then_with(|| a.stats.callee.cmp(&b.stats.callee))
    });
    edges
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("dot".parse::<ExportFormat>().unwrap(), ExportFormat::Dot);
        assert_eq!(
            "Cytoscape".parse::<ExportFormat>().unwrap(),
            ExportFormat::Cytoscape
        );
        assert_eq!(
            "MERMAID".parse::<ExportFormat>().unwrap(),
            ExportFormat::Mermaid
        );
        assert!(matches!(
            "svg".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(f)) if f == "svg"
        ));
    }

    #[test]
    fn test_empty_graph_exports_are_well_formed() {
        let graph = ServiceGraph::new();

        let dot = export(&graph, ExportFormat::Dot).unwrap();
        assert!(dot.starts_with("digraph service_mesh {"));
        assert!(dot.trim_end().ends_with('}'));

        let cyto: serde_json::Value =
            serde_json::from_str(&export(&graph, ExportFormat::Cytoscape).unwrap()).unwrap();
        assert_eq!(cyto["elements"].as_array().unwrap().len(), 0);

        assert_eq!(export(&graph, ExportFormat::Mermaid).unwrap(), "graph TB\n");

        let topology: serde_json::Value =
            serde_json::from_str(&export_topology_json(&graph).unwrap()).unwrap();
        assert_eq!(topology["metrics"]["total_services"], 0);
        assert_eq!(topology["services"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_topology_json_counts_match_graph() {
        let graph = testing::sample_graph();
        let topology: serde_json::Value =
            serde_json::from_str(&graph.export_topology_json().unwrap()).unwrap();
        assert_eq!(topology["metrics"]["total_services"], 3);
        assert_eq!(topology["metrics"]["total_connections"], 2);
        assert_eq!(topology["metrics"]["total_errors"], 1);
    }

    #[test]
    fn test_export_does_not_mutate_graph() {
        let graph = testing::sample_graph();
        let before = graph.clone();
        for format in [ExportFormat::Dot, ExportFormat::Cytoscape, ExportFormat::Mermaid] {
            graph.export(format).unwrap();
        }
        assert!(graph.same_contents(&before));
        assert_eq!(graph.version(), before.version());
    }
}
