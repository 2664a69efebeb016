//! Tracegraph Core - span model, dependency graph, and graph analysis
//!
//! This crate turns distributed-trace spans into a service dependency graph:
//!
//! - **Span**: the unit of work reported by a traced service
//! - **Builder**: registry and dependency table maintained per trace
//! - **Graph**: the materialized, versioned view readers query
//! - **Analyzer**: dependencies, critical paths, cycles, bottlenecks, blast radius
//! - **Engine / Ingest**: snapshot publication and the single-writer ingestion task

pub mod analyzer;
pub mod builder;
pub mod config;
pub mod engine;
pub mod graph;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod sketch;
pub mod source;
pub mod span;

// Re-export commonly used types
pub use analyzer::{
    BlastRadiusReport, Bottleneck, BottleneckKind, DependencyLink, DependencyReport,
    GraphAnalyzer, Hop, OperationCount, ServiceStats, TopologyConnection, TopologyDocument,
    TopologyMetrics, TopologyService,
};
pub use builder::{GraphBuilder, TraceSummary};
pub use config::{ConfigError, ConfigLoader, ConfigResult, EngineConfig};
pub use engine::{GraphEngine, SharedEngine};
pub use graph::{GraphEdge, ServiceGraph};
pub use ingest::{IngestError, IngestHandle, IngestResult, IngestService};
pub use metrics::{EngineMetrics, SharedMetrics};
pub use model::{ServiceEdge, ServiceNode};
pub use sketch::LatencySketch;
pub use source::{JsonlTraceSource, SourceError, SourceResult, TraceSource, VecTraceSource};
pub use span::{Span, SpanLog, SpanStatus};

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
