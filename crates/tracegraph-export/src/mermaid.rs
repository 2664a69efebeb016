//! Mermaid flowchart renderer
//!
//! One line per edge. Nodes only appear through the edges that touch them,
//! so services without any connection are not drawn.

use crate::sorted_edges;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use tracegraph_core::ServiceGraph;

pub fn render(graph: &ServiceGraph) -> String {
    let mut out = String::from("graph TB\n");
    let mut ids = NodeIds::default();

    for edge in sorted_edges(graph) {
        let stats = &edge.stats;
        let from = ids.get(&stats.caller);
        let to = ids.get(&stats.callee);
        let _ = writeln!(
            out,
            "    {from}[\"{from_label}\"] -->|{calls}| {to}[\"{to_label}\"]",
            from_label = label(&stats.caller),
            calls = stats.call_count,
            to_label = label(&stats.callee),
        );
    }

    out
}

/// Stable `[A-Za-z0-9_]` identifiers, suffixed when two names collide
#[derive(Default)]
struct NodeIds {
    assigned: HashMap<String, String>,
    taken: HashSet<String>,
}

impl NodeIds {
    fn get(&mut self, name: &str) -> String {
        if let Some(id) = self.assigned.get(name) {
            return id.clone();
        }

        let base = sanitize(name);
        let mut id = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&id) {
            suffix += 1;
            id = format!("{base}_{suffix}");
        }

        self.taken.insert(id.clone());
        self.assigned.insert(name.to_string(), id.clone());
        id
    }
}

fn sanitize(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.is_empty() {
        "_".to_string()
    } else {
        id
    }
}

fn label(name: &str) -> String {
    name.replace('"', "#quot;")
}
