//! Progress events for long-running analysis runs.
//!
//! The pipeline pushes typed [`ProgressEvent`]s into a [`ProgressReporter`],
//! which fans them out to any number of [`ProgressSink`]s. Delivery is
//! best-effort: a sink that fails (a closed channel, a disconnected stream)
//! is logged once and the run carries on.

pub mod sse;
pub mod terminal;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{ConsolidatedReport, PipelineMetadata};

pub use sse::{sse_frame, SseSink};
pub use terminal::TerminalProgress;

/// A step of the pipeline, as reported to progress consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    Normalize,
    Extraction,
    PatternRecognition,
    Reporting,
    Consolidation,
    SingleCall,
}

impl PipelineStage {
    /// Short human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Normalize => "Preparing contributions",
            PipelineStage::Extraction => "Extracting changes",
            PipelineStage::PatternRecognition => "Recognizing patterns",
            PipelineStage::Reporting => "Writing reports",
            PipelineStage::Consolidation => "Consolidating",
            PipelineStage::SingleCall => "Analyzing in one pass",
        }
    }
}

/// Wire-level progress event.
///
/// Serialises as `{"type":"progress",...}`, `{"type":"complete",...}` or
/// `{"type":"error",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        step: PipelineStage,
        current: usize,
        total: usize,
        message: String,
    },
    Complete {
        data: Box<ConsolidatedReport>,
        metadata: PipelineMetadata,
    },
    Error {
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

/// Why a sink could not take an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("progress consumer has disconnected")]
    Closed,

    #[error("failed to write progress event: {0}")]
    Write(String),
}

/// A consumer of progress events.
pub trait ProgressSink: Send + Sync {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.tx.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Run-scoped state behind the progress stream. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub stage: Option<PipelineStage>,
    pub processed: usize,
    pub total: usize,
    pub error: Option<String>,
    pub finished: bool,
}

/// Tracks [`PipelineState`] and fans events out to sinks.
///
/// Thread-safe; shared across pool workers via `Arc`.
#[derive(Default)]
pub struct ProgressReporter {
    sinks: Vec<Arc<dyn ProgressSink>>,
    state: Mutex<PipelineState>,
    delivery_failed: AtomicBool,
}

impl ProgressReporter {
    /// A reporter with no sinks; state is still tracked.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Report `current` of `total` items done in `step`.
    ///
    /// Counts within a stage only move forward: a worker that reports late
    /// with a smaller count is dropped rather than rewinding consumers.
    pub fn progress(
        &self,
        step: PipelineStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) {
        let mut state = self.lock();
        if state.finished {
            *state = PipelineState::default();
        }
        if state.stage == Some(step) && current < state.processed {
            return;
        }
        state.stage = Some(step);
        state.processed = current;
        state.total = total;
        self.emit(&ProgressEvent::Progress {
            step,
            current,
            total,
            message: message.into(),
        });
    }

    /// Report the terminal success event.
    pub fn complete(&self, report: &ConsolidatedReport, metadata: &PipelineMetadata) {
        let mut state = self.lock();
        state.finished = true;
        self.emit(&ProgressEvent::Complete {
            data: Box::new(report.clone()),
            metadata: metadata.clone(),
        });
    }

    /// Report the terminal failure event.
    pub fn error(&self, error: impl Into<String>) {
        let error = error.into();
        let mut state = self.lock();
        state.finished = true;
        state.error = Some(error.clone());
        self.emit(&ProgressEvent::Error { error });
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PipelineState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the state lock held so events leave in order.
    fn emit(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event) {
                if !self.delivery_failed.swap(true, Ordering::Relaxed) {
                    tracing::warn!(error = %e, "progress delivery failed; continuing without it");
                } else {
                    tracing::debug!(error = %e, "progress delivery failed");
                }
            }
        }
    }
}
