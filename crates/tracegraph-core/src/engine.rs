//! Graph engine - owns the builder and publishes read snapshots
//!
//! Writers are serialized through a mutex around the builder. After each
//! trace the builder's copy-on-write graph is published, so readers always
//! work on a complete, immutable snapshot and never see a half-applied trace.

use crate::analyzer::{
    BlastRadiusReport, Bottleneck, DependencyReport, GraphAnalyzer, Hop, TopologyDocument,
};
use crate::builder::{GraphBuilder, TraceSummary};
use crate::config::EngineConfig;
use crate::graph::ServiceGraph;
use crate::metrics::{EngineMetrics, SharedMetrics};
use crate::span::Span;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared engine handle
pub type SharedEngine = Arc<GraphEngine>;

/// The dependency graph engine
pub struct GraphEngine {
    config: EngineConfig,
    builder: Mutex<GraphBuilder>,
    snapshot: RwLock<Arc<ServiceGraph>>,
    metrics: SharedMetrics,
}

impl GraphEngine {
    pub fn new(config: EngineConfig) -> Self {
        let builder = GraphBuilder::with_sketch(config.sketch);
        let snapshot = builder.graph();
        Self {
            config,
            builder: Mutex::new(builder),
            snapshot: RwLock::new(snapshot),
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Create a shared engine
    pub fn shared(config: EngineConfig) -> SharedEngine {
        Arc::new(Self::new(config))
    }

    /// Apply one trace and publish the resulting graph
    pub fn add_trace(&self, spans: &[Span]) -> TraceSummary {
        let summary = {
            let mut builder = self.builder.lock();
            let summary = builder.add_trace(spans);
            // published under the writer lock so versions never go backwards
            *self.snapshot.write() = builder.graph();
            summary
        };

        self.metrics.record_trace(&summary);
        self.metrics.record_snapshot();
        summary
    }

    /// Latest published graph
    pub fn snapshot(&self) -> Arc<ServiceGraph> {
        self.snapshot.read().clone()
    }

    /// Materialize the graph from the registry and table, bypassing patches
    pub fn rebuild_graph(&self) -> ServiceGraph {
        self.builder.lock().rebuild_graph()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    fn query<T>(&self, f: impl FnOnce(&GraphAnalyzer<'_>) -> T) -> T {
        let snapshot = self.snapshot();
        let analyzer =
            GraphAnalyzer::new(&snapshot).with_settings(self.config.analysis.clone());
        f(&analyzer)
    }

    pub fn service_dependencies(&self, name: &str) -> Option<DependencyReport> {
        self.query(|a| a.service_dependencies(name))
    }

    pub fn critical_path(&self, start: &str, end: &str) -> Vec<Hop> {
        self.query(|a| a.critical_path(start, end))
    }

    pub fn circular_dependencies(&self) -> Vec<Vec<String>> {
        self.query(|a| a.circular_dependencies())
    }

    pub fn bottlenecks(&self, latency_threshold_ms: Option<f64>) -> Vec<Bottleneck> {
        self.query(|a| a.bottlenecks(latency_threshold_ms))
    }

    pub fn blast_radius(&self, name: &str) -> BlastRadiusReport {
        self.query(|a| a.blast_radius(name))
    }

    pub fn service_mesh_topology(&self) -> TopologyDocument {
        self.query(|a| a.service_mesh_topology())
    }

    /// Topology document for persistence and interchange
    pub fn export_topology_json(&self) -> TopologyDocument {
        self.service_mesh_topology()
    }

    /// Services unseen for longer than the configured retention window.
    /// A window too large to represent marks nothing stale.
    pub fn stale_services(&self, now: DateTime<Utc>) -> Vec<String> {
        let retention = i64::try_from(self.config.ingest.retention_secs)
            .ok()
            .and_then(Duration::try_seconds);
        match retention {
            Some(retention) => self.query(|a| a.stale_services(now, retention)),
            None => Vec::new(),
        }
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn trace(id: &str, caller: &str, callee: &str) -> Vec<Span> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        vec![
            Span::new(id, "root", caller, "handle", start, 10.0),
            Span::new(id, "child", callee, "query", start, 4.0).with_parent("root"),
        ]
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let engine = GraphEngine::default();
        engine.add_trace(&trace("t1", "api", "db"));
        let snapshot = engine.snapshot();

        engine.add_trace(&trace("t2", "api", "db"));
        assert_eq!(snapshot.edge("api", "db").unwrap().weight, 1);
        assert_eq!(engine.snapshot().edge("api", "db").unwrap().weight, 2);
        assert_eq!(engine.snapshot().version(), 2);
    }

    #[test]
    fn test_queries_and_metrics() {
        let engine = GraphEngine::default();
        engine.add_trace(&trace("t1", "web", "api"));
        engine.add_trace(&trace("t2", "api", "db"));

        assert!(engine.service_dependencies("api").is_some());
        assert!(engine.service_dependencies("nope").is_none());
        assert_eq!(engine.critical_path("web", "db").len(), 2);
        assert!(engine.circular_dependencies().is_empty());
        assert_eq!(engine.blast_radius("web").affected_count, 2);
        assert_eq!(engine.service_mesh_topology().metrics.total_connections, 2);

        let metrics = engine.metrics();
        assert_eq!(metrics.traces_ingested.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.cross_service_calls.load(Ordering::Relaxed), 2);
        assert!(engine.snapshot().same_contents(&engine.rebuild_graph()));
    }

    #[test]
    fn test_concurrent_writers() {
        let engine = GraphEngine::shared(EngineConfig::default());
        let workers: Vec<_> = (0..8)
            .map(|w| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        engine.add_trace(&trace(&format!("w{w}-{i}"), "api", "db"));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.version(), 400);
        assert_eq!(snapshot.edge("api", "db").unwrap().stats.call_count, 400);
        assert_eq!(snapshot.node("api").unwrap().call_count, 400);
    }

    #[test]
    fn test_stale_services_with_huge_retention() {
        let now = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        for retention_secs in [10_000_000_000_000, u64::MAX] {
            let mut config = EngineConfig::default();
            config.ingest.retention_secs = retention_secs;
            let engine = GraphEngine::new(config);
            engine.add_trace(&trace("t1", "api", "db"));

            assert!(engine.stale_services(now).is_empty());
        }

        let mut config = EngineConfig::default();
        config.ingest.retention_secs = 60;
        let engine = GraphEngine::new(config);
        engine.add_trace(&trace("t1", "api", "db"));
        assert_eq!(engine.stale_services(now), vec!["api", "db"]);
    }
}
