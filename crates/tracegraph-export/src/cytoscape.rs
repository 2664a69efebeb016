//! Cytoscape.js elements renderer

use crate::{sorted_edges, sorted_nodes, ExportResult};
use serde_json::{json, Value};
use tracegraph_core::ServiceGraph;

/// Edge element id, `caller->callee`
pub fn edge_id(caller: &str, callee: &str) -> String {
    format!("{caller}->{callee}")
}

pub fn render(graph: &ServiceGraph) -> ExportResult<String> {
    let mut elements: Vec<Value> = Vec::with_capacity(graph.node_count() + graph.edge_count());

    for node in sorted_nodes(graph) {
        elements.push(json!({
            "group": "nodes",
            "data": {
                "id": node.name,
                "label": node.name,
                "version": node.version,
                "environment": node.environment,
                "call_count": node.call_count,
                "error_count": node.error_count,
                "error_rate": node.error_rate(),
                "avg_latency": node.avg_latency,
                "p95_latency": node.p95_latency,
                "p99_latency": node.p99_latency,
            }
        }));
    }

    for edge in sorted_edges(graph) {
        let stats = &edge.stats;
        elements.push(json!({
            "group": "edges",
            "data": {
                "id": edge_id(&stats.caller, &stats.callee),
                "source": stats.caller,
                "target": stats.callee,
                "call_count": stats.call_count,
                "error_count": stats.error_count,
                "success_rate": stats.success_rate,
                "avg_latency": stats.avg_latency,
                "p95_latency": stats.p95_latency,
                "weight": edge.weight,
            }
        }));
    }

    Ok(serde_json::to_string_pretty(&json!({ "elements": elements }))?)
}
