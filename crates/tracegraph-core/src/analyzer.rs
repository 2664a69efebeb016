//! Read-only analysis over a materialized service graph
//!
//! All queries take a snapshot and never mutate it. Absent services and
//! missing paths are reported through `Option`, empty vectors or zeroed
//! reports rather than errors.

use crate::config::AnalysisSettings;
use crate::graph::{GraphEdge, NodeId, ServiceGraph};
use crate::model::{ServiceEdge, ServiceNode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet, VecDeque};

/// Identity and call statistics of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub name: String,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub call_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&ServiceNode> for ServiceStats {
    fn from(node: &ServiceNode) -> Self {
        Self {
            name: node.name.clone(),
            version: node.version.clone(),
            environment: node.environment.clone(),
            call_count: node.call_count,
            error_count: node.error_count,
            error_rate: node.error_rate(),
            avg_latency: node.avg_latency,
            p95_latency: node.p95_latency,
            p99_latency: node.p99_latency,
            last_seen: node.last_seen,
        }
    }
}

/// Operation name with its occurrence count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCount {
    pub operation: String,
    pub count: u64,
}

/// One neighbour of a service in a dependency report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyLink {
    /// The callee (for dependencies) or the caller (for dependents)
    pub service: String,
    pub call_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub top_operations: Vec<OperationCount>,
}

/// A service together with its outgoing and incoming calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub service: ServiceStats,

    /// Services called by this service, busiest first
    pub dependencies: Vec<DependencyLink>,

    /// Services calling this service, busiest first
    pub dependents: Vec<DependencyLink>,
}

/// One edge along a critical path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
    pub call_count: u64,
    pub avg_latency: f64,
    pub success_rate: f64,
}

/// Condition that made a service a bottleneck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BottleneckKind {
    HighLatency {
        avg_latency: f64,
        threshold: f64,
        call_count: u64,
    },
    HighErrorRate {
        error_rate: f64,
        error_count: u64,
        call_count: u64,
    },
    HighFanIn {
        dependent_count: usize,
        dependents: Vec<String>,
    },
}

/// A flagged service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub service: String,

    #[serde(flatten)]
    pub kind: BottleneckKind,

    /// Ranking score; absent scores rank as 0
    pub impact_score: Option<f64>,
}

impl Bottleneck {
    fn score(&self) -> f64 {
        self.impact_score.unwrap_or(0.0)
    }
}

/// Downstream impact of a failing service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlastRadiusReport {
    pub service: String,
    pub affected_count: usize,
    pub affected_services: Vec<String>,
    pub total_calls_affected: u64,

    /// Affected services that many others depend on
    pub critical_services: Vec<String>,

    /// `affected_count * total_calls_affected`
    pub blast_radius_score: u64,
}

/// A service entry in the topology document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyService {
    #[serde(flatten)]
    pub stats: ServiceStats,
    pub dependency_count: usize,
    pub dependent_count: usize,
}

/// A connection entry in the topology document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConnection {
    pub source: String,
    pub target: String,
    pub call_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub top_operations: Vec<OperationCount>,
    pub error_types: BTreeMap<String, u64>,
}

/// Whole-graph totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetrics {
    pub total_services: usize,
    pub total_connections: usize,
    pub total_calls: u64,
    pub total_errors: u64,
}

/// Full snapshot of the service mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    pub services: Vec<TopologyService>,
    pub connections: Vec<TopologyConnection>,
    pub metrics: TopologyMetrics,
}

/// Read-only queries over a graph snapshot
pub struct GraphAnalyzer<'a> {
    graph: &'a ServiceGraph,
    settings: AnalysisSettings,
}

impl<'a> GraphAnalyzer<'a> {
    pub fn new(graph: &'a ServiceGraph) -> Self {
        Self {
            graph,
            settings: AnalysisSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Statistics and neighbours of a service; None if never observed
    pub fn service_dependencies(&self, name: &str) -> Option<DependencyReport> {
        let id = self.graph.node_id(name)?;
        let top = self.settings.top_operations;

        let mut dependencies: Vec<DependencyLink> = self
            .graph
            .outgoing(id)
            .map(|edge| link(&edge.stats, &edge.stats.callee, top))
            .collect();
        let mut dependents: Vec<DependencyLink> = self
            .graph
            .incoming(id)
            .map(|edge| link(&edge.stats, &edge.stats.caller, top))
            .collect();
        for links in [&mut dependencies, &mut dependents] {
            links.sort_by(|a, b| {
                b.call_count
                    .cmp(&a.call_count)
                    .then_with(|| a.service.cmp(&b.service))
            });
        }

        Some(DependencyReport {
            service: ServiceStats::from(self.graph.node_at(id)),
            dependencies,
            dependents,
        })
    }

    /// Lowest-cost path from `start` to `end`, where crossing an edge costs
    /// `1 / call_count`. Empty when either endpoint is unknown, no path
    /// exists, or `start == end`.
    pub fn critical_path(&self, start: &str, end: &str) -> Vec<Hop> {
        let (Some(source), Some(target)) = (self.graph.node_id(start), self.graph.node_id(end))
        else {
            return Vec::new();
        };
        if source == target {
            return Vec::new();
        }

        let n = self.graph.node_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut via: Vec<Option<&GraphEdge>> = vec![None; n];
        let mut heap = BinaryHeap::new();

        dist[source] = 0.0;
        heap.push(Frontier {
            cost: 0.0,
            node: source,
        });

        while let Some(Frontier { cost, node }) = heap.pop() {
            if node == target {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for edge in self.graph.outgoing(node) {
                if edge.weight == 0 {
                    continue;
                }
                let next = cost + 1.0 / edge.weight as f64;
                if next < dist[edge.to] {
                    dist[edge.to] = next;
                    via[edge.to] = Some(edge);
                    heap.push(Frontier {
                        cost: next,
                        node: edge.to,
                    });
                }
            }
        }

        let mut hops = Vec::new();
        let mut cursor = target;
        while let Some(edge) = via[cursor] {
            hops.push(Hop {
                from: edge.stats.caller.clone(),
                to: edge.stats.callee.clone(),
                call_count: edge.stats.call_count,
                avg_latency: edge.stats.avg_latency,
                success_rate: edge.stats.success_rate,
            });
            cursor = edge.from;
        }
        if cursor != source {
            return Vec::new();
        }
        hops.reverse();
        hops
    }

    /// Every simple directed cycle, each rotated to start at its
    /// lexicographically smallest service.
    pub fn circular_dependencies(&self) -> Vec<Vec<String>> {
        let n = self.graph.node_count();
        let forward: Vec<Vec<NodeId>> = (0..n)
            .map(|v| self.graph.outgoing(v).map(|e| e.to).collect())
            .collect();
        let backward: Vec<Vec<NodeId>> = (0..n)
            .map(|v| self.graph.incoming(v).map(|e| e.from).collect())
            .collect();

        let mut found: Vec<Vec<NodeId>> = Vec::new();
        for start in 0..n {
            let Some(component) = component_of(&forward, &backward, start) else {
                continue;
            };
            let mut search = CircuitSearch {
                adjacency: &forward,
                component,
                start,
                blocked: vec![false; n],
                blocked_by: vec![HashSet::new(); n],
                stack: Vec::new(),
                cycles: &mut found,
            };
            search.circuit(start);
        }

        let mut cycles: Vec<Vec<String>> = found
            .into_iter()
            .map(|ids| {
                let mut names: Vec<String> = ids
                    .into_iter()
                    .map(|id| self.graph.node_at(id).name.clone())
                    .collect();
                if let Some(min) = names
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(i, _)| i)
                {
                    names.rotate_left(min);
                }
                names
            })
            .collect();
        cycles.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        cycles
    }

    /// Flag slow, failing and heavily depended-on services, highest impact
    /// first. `latency_threshold_ms` falls back to the configured threshold.
    pub fn bottlenecks(&self, latency_threshold_ms: Option<f64>) -> Vec<Bottleneck> {
        let threshold = latency_threshold_ms.unwrap_or(self.settings.latency_threshold_ms);
        let mut findings = Vec::new();

        for node in self.graph.nodes() {
            if node.avg_latency > threshold {
                findings.push(Bottleneck {
                    service: node.name.clone(),
                    kind: BottleneckKind::HighLatency {
                        avg_latency: node.avg_latency,
                        threshold,
                        call_count: node.call_count,
                    },
                    impact_score: Some(node.call_count as f64 * node.avg_latency),
                });
            }

            let error_rate = node.error_rate();
            if node.call_count > 0 && error_rate > self.settings.error_rate_threshold_pct {
                findings.push(Bottleneck {
                    service: node.name.clone(),
                    kind: BottleneckKind::HighErrorRate {
                        error_rate,
                        error_count: node.error_count,
                        call_count: node.call_count,
                    },
                    impact_score: None,
                });
            }

            if node.dependents.len() > self.settings.fan_in_threshold {
                findings.push(Bottleneck {
                    service: node.name.clone(),
                    kind: BottleneckKind::HighFanIn {
                        dependent_count: node.dependents.len(),
                        dependents: node.dependents.iter().cloned().collect(),
                    },
                    impact_score: None,
                });
            }
        }

        findings.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then_with(|| a.service.cmp(&b.service))
        });
        findings
    }

    /// Everything transitively downstream of `name`
    pub fn blast_radius(&self, name: &str) -> BlastRadiusReport {
        let Some(origin) = self.graph.node_id(name) else {
            return BlastRadiusReport {
                service: name.to_string(),
                ..Default::default()
            };
        };

        let mut visited = vec![false; self.graph.node_count()];
        visited[origin] = true;
        let mut queue = VecDeque::from([origin]);
        let mut affected: Vec<&ServiceNode> = Vec::new();

        while let Some(node) = queue.pop_front() {
            for edge in self.graph.outgoing(node) {
                if !visited[edge.to] {
                    visited[edge.to] = true;
                    affected.push(self.graph.node_at(edge.to));
                    queue.push_back(edge.to);
                }
            }
        }
        affected.sort_by(|a, b| a.name.cmp(&b.name));

        let total_calls_affected: u64 = affected.iter().map(|n| n.call_count).sum();
        let critical_services = affected
            .iter()
            .filter(|n| n.dependents.len() > self.settings.critical_dependents_threshold)
            .map(|n| n.name.clone())
            .collect();

        BlastRadiusReport {
            service: name.to_string(),
            affected_count: affected.len(),
            affected_services: affected.iter().map(|n| n.name.clone()).collect(),
            total_calls_affected,
            critical_services,
            blast_radius_score: affected.len() as u64 * total_calls_affected,
        }
    }

    /// Full topology with whole-graph totals
    pub fn service_mesh_topology(&self) -> TopologyDocument {
        let top = self.settings.topology_top_operations;

        let services = self
            .graph
            .nodes()
            .map(|node| TopologyService {
                stats: ServiceStats::from(node),
                dependency_count: node.dependencies.len(),
                dependent_count: node.dependents.len(),
            })
            .collect();

        let connections = self
            .graph
            .edges()
            .map(|edge| TopologyConnection {
                source: edge.stats.caller.clone(),
                target: edge.stats.callee.clone(),
                call_count: edge.stats.call_count,
                error_count: edge.stats.error_count,
                success_rate: edge.stats.success_rate,
                avg_latency: edge.stats.avg_latency,
                p95_latency: edge.stats.p95_latency,
                top_operations: operations(&edge.stats, top),
                error_types: edge.stats.error_type_counts.clone(),
            })
            .collect();

        let (total_calls, total_errors) = self.graph.totals();
        TopologyDocument {
            services,
            connections,
            metrics: TopologyMetrics {
                total_services: self.graph.node_count(),
                total_connections: self.graph.edge_count(),
                total_calls,
                total_errors,
            },
        }
    }

    /// Services not seen within `retention` of `now`. Empty when the
    /// cut-off falls outside the representable time range.
    pub fn stale_services(&self, now: DateTime<Utc>, retention: Duration) -> Vec<String> {
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        let mut stale: Vec<String> = self
            .graph
            .nodes()
            .filter(|node| node.last_seen.map_or(true, |seen| seen < cutoff))
            .map(|node| node.name.clone())
            .collect();
        stale.sort();
        stale
    }
}

fn operations(edge: &ServiceEdge, n: usize) -> Vec<OperationCount> {
    edge.top_operations(n)
        .into_iter()
        .map(|(operation, count)| OperationCount { operation, count })
        .collect()
}

fn link(edge: &ServiceEdge, neighbour: &str, top: usize) -> DependencyLink {
    DependencyLink {
        service: neighbour.to_string(),
        call_count: edge.call_count,
        error_count: edge.error_count,
        success_rate: edge.success_rate,
        avg_latency: edge.avg_latency,
        p95_latency: edge.p95_latency,
        top_operations: operations(edge, top),
    }
}

/// Min-heap entry for Dijkstra
#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    node: NodeId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Strongly connected component of `start` in the subgraph of nodes
/// `>= start`, or None when it holds no cycle through `start`.
fn component_of(
    forward: &[Vec<NodeId>],
    backward: &[Vec<NodeId>],
    start: NodeId,
) -> Option<Vec<bool>> {
    let reach = |adjacency: &[Vec<NodeId>]| {
        let mut seen = vec![false; adjacency.len()];
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(v) = stack.pop() {
            for &w in &adjacency[v] {
                if w >= start && !seen[w] {
                    seen[w] = true;
                    stack.push(w);
                }
            }
        }
        seen
    };

    let downstream = reach(forward);
    let upstream = reach(backward);
    let component: Vec<bool> = downstream
        .iter()
        .zip(&upstream)
        .map(|(d, u)| *d && *u)
        .collect();

    let nontrivial =
        component.iter().filter(|c| **c).count() > 1 || forward[start].contains(&start);
    nontrivial.then_some(component)
}

/// Johnson's elementary circuit search rooted at `start`
struct CircuitSearch<'g> {
    adjacency: &'g [Vec<NodeId>],
    component: Vec<bool>,
    start: NodeId,
    blocked: Vec<bool>,
    blocked_by: Vec<HashSet<NodeId>>,
    stack: Vec<NodeId>,
    cycles: &'g mut Vec<Vec<NodeId>>,
}

impl CircuitSearch<'_> {
    fn circuit(&mut self, v: NodeId) -> bool {
        let adjacency = self.adjacency;
        let mut closed = false;
        self.stack.push(v);
        self.blocked[v] = true;

        for &w in &adjacency[v] {
            if !self.component[w] {
                continue;
            }
            if w == self.start {
                self.cycles.push(self.stack.clone());
                closed = true;
            } else if !self.blocked[w] && self.circuit(w) {
                closed = true;
            }
        }

        if closed {
            self.unblock(v);
        } else {
            for &w in &adjacency[v] {
                if self.component[w] {
                    self.blocked_by[w].insert(v);
                }
            }
        }

        self.stack.pop();
        closed
    }

    fn unblock(&mut self, u: NodeId) {
        self.blocked[u] = false;
        let waiting = std::mem::take(&mut self.blocked_by[u]);
        for w in waiting {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::span::{Span, SpanStatus};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Record `calls` traces of `caller` calling `callee`
    fn call(builder: &mut GraphBuilder, caller: &str, callee: &str, calls: usize, latency: f64) {
        for i in 0..calls {
            let trace = format!("{caller}-{callee}-{i}");
            builder.add_trace(&[
                Span::new(&trace, "root", caller, "handle", at(0), latency + 1.0),
                Span::new(&trace, "child", callee, format!("op{}", i % 2), at(1), latency)
                    .with_parent("root"),
            ]);
        }
    }

    fn graph_of(edges: &[(&str, &str, usize)]) -> Arc<ServiceGraph> {
        let mut builder = GraphBuilder::new();
        for (caller, callee, calls) in edges {
            call(&mut builder, caller, callee, *calls, 10.0);
        }
        builder.graph()
    }

    #[test]
    fn test_unknown_service_has_no_report() {
        let graph = ServiceGraph::new();
        assert!(GraphAnalyzer::new(&graph)
            .service_dependencies("unseen-service")
            .is_none());
    }

    #[test]
    fn test_dependency_report_sorted_by_calls() {
        let graph = graph_of(&[("api", "db", 3), ("api", "cache", 7), ("web", "api", 2)]);
        let report = GraphAnalyzer::new(&graph)
            .service_dependencies("api")
            .unwrap();

        assert_eq!(report.service.name, "api");
        let callees: Vec<&str> = report
            .dependencies
            .iter()
            .map(|l| l.service.as_str())
            .collect();
        assert_eq!(callees, vec!["cache", "db"]);
        assert_eq!(report.dependents.len(), 1);
        assert_eq!(report.dependents[0].service, "web");
        assert_eq!(report.dependencies[0].top_operations.len(), 2);
        assert_eq!(report.dependencies[0].top_operations[0].operation, "op0");
        assert_eq!(report.dependencies[0].top_operations[0].count, 4);
    }

    #[test]
    fn test_critical_path_prefers_high_traffic() {
        let graph = graph_of(&[("A", "B", 100), ("A", "C", 1), ("C", "D", 1), ("B", "D", 100)]);
        let path = GraphAnalyzer::new(&graph).critical_path("A", "D");

        let route: Vec<(&str, &str)> = path
            .iter()
            .map(|h| (h.from.as_str(), h.to.as_str()))
            .collect();
        assert_eq!(route, vec![("A", "B"), ("B", "D")]);
        assert_eq!(path[0].call_count, 100);
        assert_eq!(path[1].success_rate, 100.0);
    }

    #[test]
    fn test_critical_path_absent_cases() {
        let graph = graph_of(&[("A", "B", 1), ("C", "B", 1)]);
        let analyzer = GraphAnalyzer::new(&graph);
        assert!(analyzer.critical_path("A", "C").is_empty());
        assert!(analyzer.critical_path("B", "A").is_empty());
        assert!(analyzer.critical_path("A", "nowhere").is_empty());
        assert!(analyzer.critical_path("A", "A").is_empty());
    }

    #[test]
    fn test_single_cycle_detected() {
        let graph = graph_of(&[("B", "C", 1), ("A", "B", 1), ("C", "A", 1)]);
        let cycles = GraphAnalyzer::new(&graph).circular_dependencies();
        assert_eq!(cycles, vec![vec!["A".to_string(), "B".into(), "C".into()]]);
    }

    #[test]
    fn test_linear_chain_has_no_cycles() {
        let graph = graph_of(&[("A", "B", 1), ("B", "C", 1)]);
        assert!(GraphAnalyzer::new(&graph).circular_dependencies().is_empty());
    }

    #[test]
    fn test_overlapping_cycles_enumerated_once() {
        // A<->B, B->C->A : cycles [A,B] and [A,B,C]
        let graph = graph_of(&[("A", "B", 1), ("B", "A", 1), ("B", "C", 1), ("C", "A", 1)]);
        let cycles = GraphAnalyzer::new(&graph).circular_dependencies();
        assert_eq!(
            cycles,
            vec![
                vec!["A".to_string(), "B".into()],
                vec!["A".to_string(), "B".into(), "C".into()],
            ]
        );
    }

    #[test]
    fn test_blast_radius_only_downstream() {
        let graph = graph_of(&[("A", "B", 2), ("B", "C", 3), ("D", "B", 1)]);
        let report = GraphAnalyzer::new(&graph).blast_radius("A");

        assert_eq!(report.affected_services, vec!["B", "C"]);
        assert_eq!(report.affected_count, 2);
        let b = graph.node("B").unwrap().call_count;
        let c = graph.node("C").unwrap().call_count;
        assert_eq!(report.total_calls_affected, b + c);
        assert_eq!(report.blast_radius_score, 2 * (b + c));
        assert!(report.critical_services.is_empty());
    }

    #[test]
    fn test_blast_radius_unknown_service() {
        let graph = graph_of(&[("A", "B", 1)]);
        let report = GraphAnalyzer::new(&graph).blast_radius("Z");
        assert_eq!(report.affected_count, 0);
        assert_eq!(report.blast_radius_score, 0);
    }

    #[test]
    fn test_blast_radius_flags_critical_services() {
        let graph = graph_of(&[
            ("A", "db", 1),
            ("B", "db", 1),
            ("C", "db", 1),
            ("D", "db", 1),
        ]);
        let report = GraphAnalyzer::new(&graph).blast_radius("A");
        assert_eq!(report.critical_services, vec!["db"]);
    }

    #[test]
    fn test_bottlenecks_ranked_by_impact() {
        let mut builder = GraphBuilder::new();
        call(&mut builder, "edge", "slow", 3, 1500.0);
        call(&mut builder, "edge", "slower", 1, 2500.0);
        for caller in ["a", "b", "c", "d", "e", "f"] {
            call(&mut builder, caller, "shared", 1, 5.0);
        }
        builder.add_trace(&[
            Span::new("fail", "x", "flaky", "op", at(0), 1.0).with_status(SpanStatus::Error)
        ]);
        let graph = builder.graph();

        let findings = GraphAnalyzer::new(&graph).bottlenecks(None);
        let latency: Vec<&str> = findings
            .iter()
            .filter(|f| matches!(f.kind, BottleneckKind::HighLatency { .. }))
            .map(|f| f.service.as_str())
            .collect();
        // slow: 3 * 1500 beats slower: 1 * 2500; edge averages above 1000 too
        assert_eq!(latency, vec!["edge", "slow", "slower"]);
        assert_eq!(findings[0].service, "edge");

        assert!(findings.iter().any(|f| f.service == "flaky"
            && matches!(f.kind, BottleneckKind::HighErrorRate { error_count: 1, call_count: 1, .. })));
        assert!(findings.iter().any(|f| f.service == "shared"
            && matches!(f.kind, BottleneckKind::HighFanIn { dependent_count: 6, .. })));

        let unscored = findings.iter().position(|f| f.impact_score.is_none()).unwrap();
        assert!(findings[unscored..].iter().all(|f| f.impact_score.is_none()));
    }

    #[test]
    fn test_bottleneck_threshold_override() {
        let graph = graph_of(&[("api", "db", 2)]);
        let analyzer = GraphAnalyzer::new(&graph);
        assert!(analyzer.bottlenecks(None).is_empty());
        assert_eq!(analyzer.bottlenecks(Some(5.0)).len(), 2);
    }

    #[test]
    fn test_topology_counts_match_graph() {
        let mut builder = GraphBuilder::new();
        call(&mut builder, "web", "api", 4, 20.0);
        call(&mut builder, "api", "db", 2, 5.0);
        builder.add_trace(&[Span::new("solo", "s", "batch", "run", at(0), 1.0)]);
        let graph = builder.graph();

        let doc = GraphAnalyzer::new(&graph).service_mesh_topology();
        assert_eq!(doc.metrics.total_services, builder.registry().len());
        assert_eq!(doc.metrics.total_connections, builder.dependency_table().len());
        assert_eq!(doc.services.len(), 4);
        assert_eq!(doc.connections.len(), 2);
        assert_eq!(doc.metrics.total_calls, 4 * 2 + 2 * 2 + 1);
        assert_eq!(doc.metrics.total_errors, 0);
        assert!(doc.connections.iter().all(|c| c.top_operations.len() <= 3));
    }

    #[test]
    fn test_stale_services() {
        let mut builder = GraphBuilder::new();
        builder.add_trace(&[Span::new("t1", "a", "old", "op", at(0), 1.0)]);
        builder.add_trace(&[Span::new("t2", "a", "fresh", "op", at(3_000), 1.0)]);
        let graph = builder.graph();

        let stale = GraphAnalyzer::new(&graph).stale_services(at(3_600), Duration::seconds(1_800));
        assert_eq!(stale, vec!["old"]);
    }

    #[test]
    fn test_stale_services_cutoff_out_of_range() {
        let mut builder = GraphBuilder::new();
        builder.add_trace(&[Span::new("t1", "a", "old", "op", at(0), 1.0)]);
        let graph = builder.graph();

        // ~270k years reaches past the earliest representable instant
        let retention = Duration::try_days(100_000_000).unwrap();
        assert!(GraphAnalyzer::new(&graph)
            .stale_services(at(3_600), retention)
            .is_empty());
    }
}
