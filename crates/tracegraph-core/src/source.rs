//! Trace sources - where batches of spans come from
//!
//! The engine consumes whole traces. A `TraceSource` yields them one at a
//! time; the JSONL source reads one span per line and groups spans by trace.

use crate::span::Span;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Trace source error type
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Supplies traces to the ingestion service
#[async_trait]
pub trait TraceSource: Send {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Next trace, or None when exhausted
    async fn next_trace(&mut self) -> SourceResult<Option<Vec<Span>>>;
}

/// In-memory source over pre-grouped traces
pub struct VecTraceSource {
    traces: VecDeque<Vec<Span>>,
}

impl VecTraceSource {
    pub fn new(traces: Vec<Vec<Span>>) -> Self {
        Self {
            traces: traces.into(),
        }
    }
}

#[async_trait]
impl TraceSource for VecTraceSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn next_trace(&mut self) -> SourceResult<Option<Vec<Span>>> {
        Ok(self.traces.pop_front())
    }
}

/// Reads spans from a JSONL file, one span per line
pub struct JsonlTraceSource {
    path: PathBuf,
    pending: Option<VecDeque<Vec<Span>>>,
}

impl JsonlTraceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: None,
        }
    }
}

#[async_trait]
impl TraceSource for JsonlTraceSource {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn next_trace(&mut self) -> SourceResult<Option<Vec<Span>>> {
        if self.pending.is_none() {
            // traces are only complete once every line has been read
            let spans = read_spans_from_file(&self.path).await?;
            let traces = group_into_traces(spans);
            info!(
                "Loaded {} traces from {}",
                traces.len(),
                self.path.display()
            );
            self.pending = Some(traces.into());
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }
}

/// Read spans from a JSONL file. Blank and `#` lines are ignored;
/// unparsable lines are logged and skipped.
pub async fn read_spans_from_file(path: &Path) -> SourceResult<Vec<Span>> {
    let file = tokio::fs::File::open(path).await?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut spans = Vec::new();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<Span>(line) {
            Ok(span) => spans.push(span),
            Err(err) => {
                warn!("Failed to parse span at line {}: {}", line_number, err);
                debug!("Line content: {}", line);
            }
        }
    }

    Ok(spans)
}

/// Group spans by trace id, keeping traces in first-appearance order
pub fn group_into_traces(spans: Vec<Span>) -> Vec<Vec<Span>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut traces: Vec<Vec<Span>> = Vec::new();

    for span in spans {
        let slot = *positions.entry(span.trace_id.clone()).or_insert_with(|| {
            traces.push(Vec::new());
            traces.len() - 1
        });
        traces[slot].push(span);
    }

    traces
}
