//! Graph building - folding traces into the service registry and dependency table
//!
//! Spans within a trace are sorted by start time, attributed to their
//! service, and linked to their parent by `parent_span_id`. A parent/child
//! pair whose services differ is a cross-service call and updates the
//! caller→callee edge. After each trace the touched nodes and edges are
//! patched into the materialized graph.

use crate::config::SketchSettings;
use crate::graph::ServiceGraph;
use crate::model::{ServiceEdge, ServiceNode};
use crate::sketch::LatencySketch;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key of the dependency table
pub type EdgeKey = (String, String);

/// What a single trace contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Spans attributed to a service
    pub spans_processed: u64,

    /// Malformed spans (no service name)
    pub spans_skipped: u64,

    /// Spans whose parent is not part of the trace
    pub orphan_spans: u64,

    /// Parent/child pairs crossing a service boundary
    pub cross_service_calls: u64,
}

/// Owns the service registry, the dependency table and the materialized graph
pub struct GraphBuilder {
    registry: HashMap<String, ServiceNode>,
    table: HashMap<EdgeKey, ServiceEdge>,
    graph: Arc<ServiceGraph>,
    sketch: SketchSettings,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_sketch(SketchSettings::default())
    }

    pub fn with_sketch(sketch: SketchSettings) -> Self {
        Self {
            registry: HashMap::new(),
            table: HashMap::new(),
            graph: Arc::new(ServiceGraph::new()),
            sketch,
        }
    }

    fn new_sketch(&self) -> LatencySketch {
        LatencySketch::new(self.sketch.relative_accuracy, self.sketch.max_buckets)
    }

    /// Apply one trace. Spans may arrive in any order.
    pub fn add_trace(&mut self, spans: &[Span]) -> TraceSummary {
        let mut summary = TraceSummary::default();

        let mut ordered: Vec<&Span> = spans.iter().collect();
        ordered.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });

        let mut dirty_nodes: Vec<String> = Vec::new();
        let mut seen_nodes: HashSet<&str> = HashSet::new();
        let mut dirty_edges: Vec<EdgeKey> = Vec::new();

        // 1. node statistics
        let mut well_formed: Vec<&Span> = Vec::with_capacity(ordered.len());
        for span in ordered {
            if !span.is_well_formed() {
                warn!(
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    "Skipping span without service name"
                );
                summary.spans_skipped += 1;
                continue;
            }

            let sketch = self.new_sketch();
            self.registry
                .entry(span.service_name.clone())
                .or_insert_with(|| ServiceNode::new(span.service_name.clone(), sketch))
                .record(span);
            summary.spans_processed += 1;

            if seen_nodes.insert(span.service_name.as_str()) {
                dirty_nodes.push(span.service_name.clone());
            }
            well_formed.push(span);
        }

        // 2. span index (first occurrence of a duplicated id wins)
        let mut index: HashMap<&str, &Span> = HashMap::with_capacity(well_formed.len());
        for span in &well_formed {
            index.entry(span.span_id.as_str()).or_insert(span);
        }

        // 3. edges
        for span in &well_formed {
            let Some(parent_id) = span.parent_span_id.as_deref() else {
                continue;
            };
            let Some(parent) = index.get(parent_id) else {
                debug!(
                    trace_id = %span.trace_id,
                    span_id = %span.span_id,
                    parent_span_id = %parent_id,
                    "Parent not in trace, treating span as root"
                );
                summary.orphan_spans += 1;
                continue;
            };
            if parent.service_name == span.service_name {
                continue;
            }

            summary.cross_service_calls += 1;
            self.link(&parent.service_name, &span.service_name);

            let key = (parent.service_name.clone(), span.service_name.clone());
            let sketch = self.new_sketch();
            let edge = self.table.entry(key.clone()).or_insert_with(|| {
                ServiceEdge::new(key.0.clone(), key.1.clone(), sketch)
            });
            edge.record(span);
            if !dirty_edges.contains(&key) {
                dirty_edges.push(key);
            }
        }

        // 4. patch the materialized view
        let graph = Arc::make_mut(&mut self.graph);
        for name in &dirty_nodes {
            graph.upsert_node(&self.registry[name]);
        }
        for key in &dirty_edges {
            graph.upsert_edge(&self.table[key]);
        }
        graph.bump_version();

        debug!(
            spans = summary.spans_processed,
            skipped = summary.spans_skipped,
            calls = summary.cross_service_calls,
            version = graph.version(),
            "Applied trace"
        );
        summary
    }

    // Both services were registered in step 1 of the same trace.
    fn link(&mut self, caller: &str, callee: &str) {
        if let Some(node) = self.registry.get_mut(caller) {
            node.dependencies.insert(callee.to_string());
        }
        if let Some(node) = self.registry.get_mut(callee) {
            node.dependents.insert(caller.to_string());
        }
    }

    /// Current materialized graph
    pub fn graph(&self) -> Arc<ServiceGraph> {
        self.graph.clone()
    }

    /// Materialize the graph from scratch; the reference for incremental patches
    pub fn rebuild_graph(&self) -> ServiceGraph {
        ServiceGraph::rebuild(self.registry.values(), self.table.values())
    }

    /// Service registry
    pub fn registry(&self) -> &HashMap<String, ServiceNode> {
        &self.registry
    }

    /// Dependency table
    pub fn dependency_table(&self) -> &HashMap<EdgeKey, ServiceEdge> {
        &self.table
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
