//! Ingestion service - a single writer task fed through a bounded channel
//!
//! Producers hold cheap `IngestHandle` clones and submit whole traces. One
//! spawned task owns the write side and applies traces to the engine in
//! arrival order, so readers only ever observe published snapshots.

use crate::engine::SharedEngine;
use crate::source::{SourceError, TraceSource};
use crate::span::Span;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Ingestion error type
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Ingestion service is closed")]
    Closed,

    #[error("Ingestion queue is full")]
    QueueFull,

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Ingestion task failed: {0}")]
    Join(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Producer side of the ingestion channel
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Vec<Span>>,
}

impl IngestHandle {
    /// Submit a trace, waiting for queue space
    pub async fn submit(&self, trace: Vec<Span>) -> IngestResult<()> {
        self.tx.send(trace).await.map_err(|_| IngestError::Closed)
    }

    /// Submit a trace without waiting
    pub fn try_submit(&self, trace: Vec<Span>) -> IngestResult<()> {
        self.tx.try_send(trace).map_err(|err| match err {
            TrySendError::Full(_) => IngestError::QueueFull,
            TrySendError::Closed(_) => IngestError::Closed,
        })
    }

    /// Forward every trace from `source`. Returns the number submitted.
    pub async fn drain_source(&self, source: &mut dyn TraceSource) -> IngestResult<u64> {
        let mut submitted = 0u64;
        while let Some(trace) = source.next_trace().await? {
            self.submit(trace).await?;
            submitted += 1;
        }
        info!("Source {} drained: {} traces", source.name(), submitted);
        Ok(submitted)
    }
}

/// The writer task and its controls
pub struct IngestService {
    tx: mpsc::Sender<Vec<Span>>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<u64>,
}

impl IngestService {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn start(engine: SharedEngine) -> Self {
        let capacity = engine.config().ingest.channel_capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<Vec<Span>>(capacity);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            info!("Ingestion started (capacity {})", capacity);
            let mut applied = 0u64;
            loop {
                tokio::select! {
                    maybe_trace = rx.recv() => {
                        let Some(trace) = maybe_trace else {
                            // every handle dropped
                            break;
                        };
                        let summary = engine.add_trace(&trace);
                        applied += 1;
                        debug!(
                            spans = summary.spans_processed,
                            calls = summary.cross_service_calls,
                            "Trace applied"
                        );
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Ingestion shutdown signal received");
                        break;
                    }
                }
            }
            info!("Ingestion stopped after {} traces", applied);
            applied
        });

        Self {
            tx,
            shutdown_tx,
            task,
        }
    }

    pub fn handle(&self) -> IngestHandle {
        IngestHandle {
            tx: self.tx.clone(),
        }
    }

    /// Pump `source` into the queue through a fresh handle
    pub async fn drain_source(&self, source: &mut dyn TraceSource) -> IngestResult<u64> {
        self.handle().drain_source(source).await
    }

    /// Stop after the trace currently being applied; queued traces are dropped
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Close the service's own sender and wait for the writer to finish.
    /// Outstanding handles keep the channel open until they are dropped.
    pub async fn join(self) -> IngestResult<u64> {
        let IngestService {
            tx,
            shutdown_tx,
            task,
        } = self;
        drop(tx);
        let applied = task
            .await
            .map_err(|err| IngestError::Join(err.to_string()))?;
        drop(shutdown_tx);
        Ok(applied)
    }
}
