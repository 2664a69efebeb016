//! Ingestion metrics for the graph engine
//!
//! Counters describing what the engine has consumed, exportable in
//! Prometheus text format or as JSON.

use crate::builder::TraceSummary;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Engine-wide ingestion counters
#[derive(Debug)]
pub struct EngineMetrics {
    /// When the engine was started
    start_time: Instant,
    pub traces_ingested: AtomicU64,
    pub spans_processed: AtomicU64,
    pub spans_skipped: AtomicU64,
    pub orphan_spans: AtomicU64,
    pub cross_service_calls: AtomicU64,
    pub snapshots_published: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            traces_ingested: AtomicU64::new(0),
            spans_processed: AtomicU64::new(0),
            spans_skipped: AtomicU64::new(0),
            orphan_spans: AtomicU64::new(0),
            cross_service_calls: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Account for one applied trace
    pub fn record_trace(&self, summary: &TraceSummary) {
        self.traces_ingested.fetch_add(1, Ordering::Relaxed);
        self.spans_processed
            .fetch_add(summary.spans_processed, Ordering::Relaxed);
        self.spans_skipped
            .fetch_add(summary.spans_skipped, Ordering::Relaxed);
        self.orphan_spans
            .fetch_add(summary.orphan_spans, Ordering::Relaxed);
        self.cross_service_calls
            .fetch_add(summary.cross_service_calls, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP tracegraph_uptime_seconds Time since engine started\n");
        output.push_str("# TYPE tracegraph_uptime_seconds gauge\n");
        output.push_str(&format!(
            "tracegraph_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP tracegraph_traces_ingested_total Traces applied to the graph\n");
        output.push_str("# TYPE tracegraph_traces_ingested_total counter\n");
        output.push_str(&format!(
            "tracegraph_traces_ingested_total {}\n\n",
            self.traces_ingested.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP tracegraph_spans_total Spans seen by outcome\n");
        output.push_str("# TYPE tracegraph_spans_total counter\n");
        output.push_str(&format!(
            "tracegraph_spans_total{{outcome=\"processed\"}} {}\n",
            self.spans_processed.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "tracegraph_spans_total{{outcome=\"skipped\"}} {}\n",
            self.spans_skipped.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "tracegraph_spans_total{{outcome=\"orphan\"}} {}\n\n",
            self.orphan_spans.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP tracegraph_cross_service_calls_total Parent/child pairs crossing services\n",
        );
        output.push_str("# TYPE tracegraph_cross_service_calls_total counter\n");
        output.push_str(&format!(
            "tracegraph_cross_service_calls_total {}\n\n",
            self.cross_service_calls.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP tracegraph_snapshots_published_total Graph snapshots made visible to readers\n",
        );
        output.push_str("# TYPE tracegraph_snapshots_published_total counter\n");
        output.push_str(&format!(
            "tracegraph_snapshots_published_total {}\n",
            self.snapshots_published.load(Ordering::Relaxed)
        ));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "traces_ingested": self.traces_ingested.load(Ordering::Relaxed),
            "spans": {
                "processed": self.spans_processed.load(Ordering::Relaxed),
                "skipped": self.spans_skipped.load(Ordering::Relaxed),
                "orphan": self.orphan_spans.load(Ordering::Relaxed),
            },
            "cross_service_calls": self.cross_service_calls.load(Ordering::Relaxed),
            "snapshots_published": self.snapshots_published.load(Ordering::Relaxed),
        })
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<EngineMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_trace_accumulates() {
        let metrics = EngineMetrics::new();
        let summary = TraceSummary {
            spans_processed: 4,
            spans_skipped: 1,
            orphan_spans: 2,
            cross_service_calls: 3,
        };
        metrics.record_trace(&summary);
        metrics.record_trace(&summary);
        metrics.record_snapshot();

        assert_eq!(metrics.traces_ingested.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.spans_processed.load(Ordering::Relaxed), 8);
        assert_eq!(metrics.cross_service_calls.load(Ordering::Relaxed), 6);

        let json = metrics.to_json();
        assert_eq!(json["spans"]["skipped"], 2);
        assert_eq!(json["snapshots_published"], 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = EngineMetrics::new();
        metrics.record_trace(&TraceSummary {
            spans_processed: 5,
            ..Default::default()
        });
        let text = metrics.to_prometheus();
        assert!(text.contains("# TYPE tracegraph_traces_ingested_total counter"));
        assert!(text.contains("tracegraph_traces_ingested_total 1\n"));
        assert!(text.contains("tracegraph_spans_total{outcome=\"processed\"} 5"));
    }
}
