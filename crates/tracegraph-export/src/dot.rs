//! Graphviz DOT renderer

use crate::{sorted_edges, sorted_nodes};
use std::fmt::Write;
use tracegraph_core::ServiceGraph;

/// Error rate (percent) above which a node is drawn red
pub const CRITICAL_ERROR_RATE: f64 = 5.0;

/// Error rate (percent) above which a node is drawn yellow
pub const WARNING_ERROR_RATE: f64 = 1.0;

/// Edges below this success rate (percent) are drawn red
pub const DEGRADED_SUCCESS_RATE: f64 = 95.0;

pub fn render(graph: &ServiceGraph) -> String {
    let mut out = String::new();
    out.push_str("digraph service_mesh {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\"];\n");
    out.push_str("  edge [fontname=\"Helvetica\", fontsize=10];\n");

    for node in sorted_nodes(graph) {
        let error_rate = node.error_rate();
        let _ = writeln!(
            out,
            "  \"{id}\" [label=\"{id}\\ncalls: {calls}\\nerrors: {rate:.2}%\", fillcolor=\"{color}\"];",
            id = escape(&node.name),
            calls = node.call_count,
            rate = error_rate,
            color = node_color(error_rate),
        );
    }

    let edges = sorted_edges(graph);
    let max_calls = edges.iter().map(|e| e.weight).max().unwrap_or(0);
    for edge in edges {
        let stats = &edge.stats;
        let _ = writeln!(
            out,
            "  \"{from}\" -> \"{to}\" [label=\"{calls} calls\\n{latency:.1}ms\", penwidth={width:.2}, color=\"{color}\"];",
            from = escape(&stats.caller),
            to = escape(&stats.callee),
            calls = stats.call_count,
            latency = stats.avg_latency,
            width = pen_width(edge.weight, max_calls),
            color = edge_color(stats.success_rate),
        );
    }

    out.push_str("}\n");
    out
}

fn node_color(error_rate: f64) -> &'static str {
    if error_rate > CRITICAL_ERROR_RATE {
        "red"
    } else if error_rate > WARNING_ERROR_RATE {
        "yellow"
    } else {
        "green"
    }
}

fn edge_color(success_rate: f64) -> &'static str {
    if success_rate < DEGRADED_SUCCESS_RATE {
        "red"
    } else {
        "gray"
    }
}

/// 1.0 for the thinnest edge up to 5.0 for the busiest
fn pen_width(calls: u64, max_calls: u64) -> f64 {
    if max_calls == 0 {
        return 1.0;
    }
    1.0 + 4.0 * calls as f64 / max_calls as f64
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_graph;
    use chrono::{TimeZone, Utc};
    use tracegraph_core::{GraphBuilder, Span};

    #[test]
    fn test_render_nodes_and_edges() {
        let dot = render(&sample_graph());

        assert!(dot.starts_with("digraph service_mesh {\n"));
        // db failed 1 of 4 calls
        assert!(dot.contains("\"db\" [label=\"db\\ncalls: 4\\nerrors: 25.00%\", fillcolor=\"red\"]"));
        assert!(dot.contains("\"web\" [label=\"web\\ncalls: 4\\nerrors: 0.00%\", fillcolor=\"green\"]"));
        assert!(dot.contains("\"api\" -> \"db\" [label=\"4 calls\\n5.0ms\", penwidth=5.00, color=\"red\"]"));
        assert!(dot.contains("\"web\" -> \"api\" [label=\"4 calls\\n20.0ms\", penwidth=5.00, color=\"gray\"]"));
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(node_color(5.0), "yellow");
        assert_eq!(node_color(5.01), "red");
        assert_eq!(node_color(1.0), "green");
        assert_eq!(edge_color(95.0), "gray");
        assert_eq!(edge_color(94.9), "red");
        assert_eq!(pen_width(5, 10), 3.0);
        assert_eq!(pen_width(0, 0), 1.0);
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape(r#"svc "a""#), r#"svc \"a\""#);
        assert_eq!(escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_newline_in_service_name_stays_on_one_line() {
        assert_eq!(escape("billing\r\nworker"), r"billing\nworker");

        let mut builder = GraphBuilder::new();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        builder.add_trace(&[
            Span::new("t", "a", "edge\nproxy", "route", start, 2.0),
            Span::new("t", "b", "api", "list", start, 1.0).with_parent("a"),
        ]);
        let dot = render(&builder.graph());

        assert!(dot.contains(r#""edge\nproxy" -> "api""#));
        // every statement sits on its own physical line
        assert!(dot
            .lines()
            .skip(4)
            .take_while(|line| *line != "}")
            .all(|line| line.trim_end().ends_with(';')));
    }
}
