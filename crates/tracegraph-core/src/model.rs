//! Aggregate state for services and caller→callee relationships

use crate::sketch::LatencySketch;
use crate::span::Span;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rolling statistics for one logical service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// Service name
    pub name: String,

    /// Version reported by the most recent span carrying one
    pub version: Option<String>,

    /// Deployment environment reported by the most recent span carrying one
    pub environment: Option<String>,

    /// Spans attributed to this service
    pub call_count: u64,

    /// Spans with ERROR status
    pub error_count: u64,

    /// Mean span duration (ms)
    pub avg_latency: f64,

    /// Estimated 95th percentile duration (ms)
    pub p95_latency: f64,

    /// Estimated 99th percentile duration (ms)
    pub p99_latency: f64,

    /// Services this service calls
    pub dependencies: BTreeSet<String>,

    /// Services calling this service
    pub dependents: BTreeSet<String>,

    /// Latest span start time observed
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(skip)]
    stats: LatencyStats,

    #[serde(skip)]
    version_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    environment_at: Option<DateTime<Utc>>,
}

impl ServiceNode {
    pub fn new(name: impl Into<String>, sketch: LatencySketch) -> Self {
        Self {
            name: name.into(),
            version: None,
            environment: None,
            call_count: 0,
            error_count: 0,
            avg_latency: 0.0,
            p95_latency: 0.0,
            p99_latency: 0.0,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            last_seen: None,
            stats: LatencyStats::new(sketch),
            version_at: None,
            environment_at: None,
        }
    }

    /// Fold one span of this service into the statistics
    pub fn record(&mut self, span: &Span) {
        self.call_count += 1;
        if span.is_error() {
            self.error_count += 1;
        }
        self.last_seen = self.last_seen.max(Some(span.start_time));

        self.stats.observe(span.latency_ms());
        self.avg_latency = self.stats.mean(self.call_count);
        self.p95_latency = self.stats.quantile(0.95);
        self.p99_latency = self.stats.quantile(0.99);

        if let Some(version) = span.service_version() {
            latest_wins(&mut self.version, &mut self.version_at, version, span.start_time);
        }
        if let Some(env) = span.environment() {
            latest_wins(&mut self.environment, &mut self.environment_at, env, span.start_time);
        }
    }

    /// Error percentage (0 when no calls)
    pub fn error_rate(&self) -> f64 {
        percentage(self.error_count, self.call_count)
    }
}

/// Call statistics for one directed caller→callee pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEdge {
    pub caller: String,
    pub callee: String,
    pub call_count: u64,
    pub error_count: u64,

    /// Mean callee span duration (ms)
    pub avg_latency: f64,

    /// Estimated 95th percentile callee span duration (ms)
    pub p95_latency: f64,

    /// Estimated 99th percentile callee span duration (ms)
    pub p99_latency: f64,

    /// `(call_count - error_count) / call_count * 100`
    pub success_rate: f64,

    /// Callee operation name → occurrences
    pub operation_counts: BTreeMap<String, u64>,

    /// Error classification → occurrences
    pub error_type_counts: BTreeMap<String, u64>,

    pub last_seen: Option<DateTime<Utc>>,

    #[serde(skip)]
    stats: LatencyStats,
}

impl ServiceEdge {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>, sketch: LatencySketch) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
            call_count: 0,
            error_count: 0,
            avg_latency: 0.0,
            p95_latency: 0.0,
            p99_latency: 0.0,
            success_rate: 100.0,
            operation_counts: BTreeMap::new(),
            error_type_counts: BTreeMap::new(),
            last_seen: None,
            stats: LatencyStats::new(sketch),
        }
    }

    /// Fold one cross-service call (the child span) into the statistics
    pub fn record(&mut self, child: &Span) {
        self.call_count += 1;
        if child.is_error() {
            self.error_count += 1;
            *self
                .error_type_counts
                .entry(child.error_type().to_string())
                .or_insert(0) += 1;
        }
        *self
            .operation_counts
            .entry(child.operation_name.clone())
            .or_insert(0) += 1;
        self.last_seen = self.last_seen.max(Some(child.start_time));

        self.stats.observe(child.latency_ms());
        self.avg_latency = self.stats.mean(self.call_count);
        self.p95_latency = self.stats.quantile(0.95);
        self.p99_latency = self.stats.quantile(0.99);
        self.success_rate = percentage(self.call_count - self.error_count, self.call_count);
    }

    pub fn error_rate(&self) -> f64 {
        percentage(self.error_count, self.call_count)
    }

    /// Most frequent operations, ties broken by name
    pub fn top_operations(&self, n: usize) -> Vec<(String, u64)> {
        let mut ops: Vec<(String, u64)> = self
            .operation_counts
            .iter()
            .map(|(op, count)| (op.clone(), *count))
            .collect();
        ops.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ops.truncate(n);
        ops
    }
}

/// Latency accumulator shared by nodes and edges.
///
/// The sum is kept in whole microseconds so the mean does not depend on the
/// order observations arrive in.
#[derive(Debug, Clone, Default, PartialEq)]
struct LatencyStats {
    total_us: u128,
    sketch: LatencySketch,
}

impl LatencyStats {
    fn new(sketch: LatencySketch) -> Self {
        Self { total_us: 0, sketch }
    }

    fn observe(&mut self, latency_ms: f64) {
        self.total_us += (latency_ms * 1000.0).round() as u128;
        self.sketch.insert(latency_ms);
    }

    fn mean(&self, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        self.total_us as f64 / count as f64 / 1000.0
    }

    fn quantile(&self, q: f64) -> f64 {
        self.sketch.quantile(q).unwrap_or(0.0)
    }
}

fn latest_wins(
    value: &mut Option<String>,
    seen_at: &mut Option<DateTime<Utc>>,
    candidate: &str,
    at: DateTime<Utc>,
) {
    let newer = match (seen_at.as_ref(), value.as_deref()) {
        (Some(prev_at), Some(prev)) => (at, candidate) > (*prev_at, prev),
        _ => true,
    };
    if newer {
        *value = Some(candidate.to_string());
        *seen_at = Some(at);
    }
}

pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanStatus, ERROR_TYPE_TAG, SERVICE_VERSION_TAG};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_node_running_mean_and_counts() {
        let mut node = ServiceNode::new("api", LatencySketch::default());
        node.record(&Span::new("t", "a", "api", "GET", at(0), 10.0));
        node.record(&Span::new("t", "b", "api", "GET", at(5), 30.0).with_status(SpanStatus::Error));
        node.record(&Span::new("t", "c", "api", "GET", at(2), 20.0).with_status(SpanStatus::Timeout));

        assert_eq!(node.call_count, 3);
        assert_eq!(node.error_count, 1);
        assert!((node.avg_latency - 20.0).abs() < 1e-9);
        assert_eq!(node.last_seen, Some(at(5)));
        assert!(node.p99_latency >= node.p95_latency);
        assert!((node.p99_latency - 30.0).abs() <= 0.3 + 1e-9);
    }

    #[test]
    fn test_node_version_latest_wins() {
        let mut node = ServiceNode::new("api", LatencySketch::default());
        node.record(&Span::new("t", "a", "api", "GET", at(10), 1.0).with_tag(SERVICE_VERSION_TAG, "2.0"));
        node.record(&Span::new("t", "b", "api", "GET", at(1), 1.0).with_tag(SERVICE_VERSION_TAG, "1.0"));
        assert_eq!(node.version.as_deref(), Some("2.0"));
        assert!(node.environment.is_none());
    }

    #[test]
    fn test_edge_success_rate_and_histograms() {
        let mut edge = ServiceEdge::new("api", "db", LatencySketch::default());
        edge.record(&Span::new("t", "a", "db", "SELECT", at(0), 4.0));
        edge.record(&Span::new("t", "b", "db", "SELECT", at(1), 6.0));
        edge.record(
            &Span::new("t", "c", "db", "INSERT", at(2), 8.0)
                .with_status(SpanStatus::Error)
                .with_tag(ERROR_TYPE_TAG, "deadlock"),
        );
        edge.record(&Span::new("t", "d", "db", "INSERT", at(3), 2.0).with_status(SpanStatus::Error));

        assert_eq!(edge.call_count, 4);
        assert_eq!(edge.error_count, 2);
        assert!((edge.success_rate - 50.0).abs() < 1e-9);
        assert!((edge.avg_latency - 5.0).abs() < 1e-9);
        assert_eq!(edge.operation_counts["SELECT"], 2);
        assert_eq!(edge.error_type_counts["deadlock"], 1);
        assert_eq!(edge.error_type_counts["unknown"], 1);
        assert_eq!(
            edge.top_operations(1),
            vec![("INSERT".to_string(), 2)]
        );
    }

    #[test]
    fn test_error_rate_with_no_calls() {
        let node = ServiceNode::new("idle", LatencySketch::default());
        assert_eq!(node.error_rate(), 0.0);
    }
}
