//! Span model - the unit of work consumed by the graph builder
//!
//! Spans arrive in batches that share a trace identifier. The engine only
//! relies on the fields below; transport and sampling happen upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tag carrying the error classification of a failed span
pub const ERROR_TYPE_TAG: &str = "error.type";

/// Tag carrying the version of the emitting service
pub const SERVICE_VERSION_TAG: &str = "service.version";

/// Tag carrying the deployment environment of the emitting service
pub const ENVIRONMENT_TAG: &str = "deployment.environment";

/// Error classification used when a failed span carries no `error.type` tag
pub const UNKNOWN_ERROR_TYPE: &str = "unknown";

/// A single traced operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span ID
    pub span_id: String,

    /// Trace this span belongs to
    pub trace_id: String,

    /// Parent span ID (None for roots; an empty string on the wire)
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_span_id: Option<String>,

    /// Emitting service (empty means the span is malformed)
    #[serde(default)]
    pub service_name: String,

    /// Operation name
    #[serde(default)]
    pub operation_name: String,

    /// Start time
    pub start_time: DateTime<Utc>,

    /// Duration in milliseconds
    #[serde(default, alias = "duration")]
    pub duration_ms: f64,

    /// Outcome
    #[serde(default)]
    pub status: SpanStatus,

    /// Open-ended string tags
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Structured log entries in emission order
    #[serde(default)]
    pub logs: Vec<SpanLog>,
}

impl Span {
    /// Create a root span with an OK status and no tags
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        service_name: impl Into<String>,
        operation_name: impl Into<String>,
        start_time: DateTime<Utc>,
        duration_ms: f64,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            parent_span_id: None,
            service_name: service_name.into(),
            operation_name: operation_name.into(),
            start_time,
            duration_ms,
            status: SpanStatus::Ok,
            tags: HashMap::new(),
            logs: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        let parent = parent_span_id.into();
        self.parent_span_id = if parent.is_empty() { None } else { Some(parent) };
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Whether the span can be attributed to a service
    pub fn is_well_formed(&self) -> bool {
        !self.service_name.trim().is_empty()
    }

    /// Whether the span failed
    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }

    /// Duration clamped to a non-negative finite value
    pub fn latency_ms(&self) -> f64 {
        if self.duration_ms.is_finite() && self.duration_ms > 0.0 {
            self.duration_ms
        } else {
            0.0
        }
    }

    /// Error classification for failed spans
    pub fn error_type(&self) -> &str {
        self.tag(ERROR_TYPE_TAG).unwrap_or(UNKNOWN_ERROR_TYPE)
    }

    pub fn service_version(&self) -> Option<&str> {
        self.tag(SERVICE_VERSION_TAG)
    }

    pub fn environment(&self) -> Option<&str> {
        self.tag(ENVIRONMENT_TAG)
    }

    /// Non-empty tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Span outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    #[serde(alias = "ok")]
    Ok,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "timeout")]
    Timeout,
}

/// Structured log entry attached to a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLog {
    /// When the entry was emitted
    pub timestamp: DateTime<Utc>,

    /// Entry fields
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
