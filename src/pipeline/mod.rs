//! The chain-of-density pipeline.
//!
//! [`ChainOfDensity`] normalizes a contribution set, resolves the caller's
//! credential once, and then either runs the three per-item stages plus
//! consolidation (`3N + 1` LLM calls) or the single-call variant (`1`).
//! Both entry points return a [`PipelineResult`] and never fail: run-level
//! errors are flattened into `success: false`.

pub mod analysis;
pub mod cancel;
pub mod consolidate;
pub mod extraction;
pub mod llm;
pub mod optimized;
pub mod patterns;
pub mod pool;
pub mod reporting;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;

use crate::cache::CacheEngine;
use crate::constants::DEFAULT_MAX_CONCURRENT;
use crate::credentials::{CredentialError, CredentialProvider};
use crate::models::{
    AnalysisContext, ConsolidatedReport, ContributionItem, ContributionSet, PipelineMetadata,
    PipelineResult, Stage1Output, Stage2Output,
};
use crate::normalize::{normalize, NormalizeError, NormalizeOptions};
use crate::parse::ParseError;
use crate::progress::{PipelineStage, ProgressReporter};
use crate::providers::rig::{retry_backoff, MAX_RETRIES};
use crate::providers::{LlmBackend, ProviderError};

pub use cancel::CancellationToken;
pub use llm::LlmSession;
pub use pool::{Interrupted, WorkerPool};

/// Why a single LLM-backed step failed for one item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Errors that abort a whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] NormalizeError),

    #[error("credential unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("no contributions to analyze after normalization")]
    NoContributions,

    #[error("{}: expected {expected} results from the previous stage, got {actual}", .stage.label())]
    LengthMismatch {
        stage: PipelineStage,
        expected: usize,
        actual: usize,
    },

    #[error("cancelled during {}: {completed} item(s) completed, {skipped} skipped", .stage.label())]
    Cancelled {
        stage: PipelineStage,
        completed: usize,
        skipped: usize,
    },

    #[error("single-call analysis failed: {0}")]
    Analysis(#[from] StageError),
}

impl PipelineError {
    pub fn cancelled(stage: PipelineStage, interrupted: Interrupted) -> Self {
        PipelineError::Cancelled {
            stage,
            completed: interrupted.completed,
            skipped: interrupted.skipped,
        }
    }
}

/// Stages index earlier results by position, so lengths must line up.
pub(crate) fn ensure_len(
    stage: PipelineStage,
    expected: usize,
    actual: usize,
) -> Result<(), PipelineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PipelineError::LengthMismatch {
            stage,
            expected,
            actual,
        })
    }
}

/// Everything a stage needs to make its calls.
#[derive(Clone)]
pub struct StageContext {
    pub session: Arc<LlmSession>,
    pub context: Arc<AnalysisContext>,
    pub rag_context: Option<Arc<str>>,
}

/// Execution strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Three calls per item plus one for the summary.
    #[default]
    Full,
    /// One call for everything.
    Optimized,
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub normalize: NormalizeOptions,
    pub context: AnalysisContext,
    /// Project-level background injected into Stage 1 prompts.
    pub rag_context: Option<String>,
    pub max_concurrent: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            context: AnalysisContext::default(),
            rag_context: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Orchestrates a run over a contribution set.
pub struct ChainOfDensity {
    backend: Arc<dyn LlmBackend>,
    credentials: Arc<dyn CredentialProvider>,
    cache: Arc<CacheEngine>,
    progress: Arc<ProgressReporter>,
    cancel: CancellationToken,
    max_retries: u32,
    backoff: fn(u32) -> Duration,
}

impl ChainOfDensity {
    pub fn new(backend: Arc<dyn LlmBackend>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            backend,
            credentials,
            cache: Arc::new(CacheEngine::disabled()),
            progress: Arc::new(ProgressReporter::new()),
            cancel: CancellationToken::new(),
            max_retries: MAX_RETRIES,
            backoff: retry_backoff,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheEngine>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the retry budget and backoff schedule for transient errors.
    pub fn with_retries(mut self, max_retries: u32, backoff: fn(u32) -> Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    /// A handle that cancels the current and future runs.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Full pipeline: three stages per item, then consolidation.
    pub async fn run(
        &self,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
    ) -> PipelineResult {
        self.run_mode(Mode::Full, contributions, user_id, options)
            .await
    }

    /// Single-call variant.
    pub async fn run_optimized(
        &self,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
    ) -> PipelineResult {
        self.run_mode(Mode::Optimized, contributions, user_id, options)
            .await
    }

    pub async fn run_mode(
        &self,
        mode: Mode,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
    ) -> PipelineResult {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, ?mode, user = user_id);
        self.run_inner(mode, contributions, user_id, options)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        mode: Mode,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
    ) -> PipelineResult {
        let started = Instant::now();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut metadata = PipelineMetadata::default();

        let outcome = match mode {
            Mode::Full => {
                self.try_full(contributions, user_id, options, &calls, &mut metadata)
                    .await
            }
            Mode::Optimized => {
                self.try_optimized(contributions, user_id, options, &calls, &mut metadata)
                    .await
            }
        };

        metadata.llm_calls = calls.load(Ordering::Acquire);
        metadata.total_duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(report) => {
                tracing::info!(
                    items = metadata.total_contributions,
                    failed = metadata.failed_contributions,
                    llm_calls = metadata.llm_calls,
                    duration_ms = metadata.total_duration_ms,
                    "run complete"
                );
                self.progress.complete(&report, &metadata);
                PipelineResult::succeeded(report, metadata)
            }
            Err(e) => {
                if let PipelineError::Cancelled { completed, .. } = &e {
                    metadata.processed_contributions = *completed;
                }
                let message = e.to_string();
                tracing::warn!(error = %message, "run failed");
                self.progress.error(message.clone());
                PipelineResult::failed(message, metadata)
            }
        }
    }

    /// Validate, normalize and resolve the credential.
    ///
    /// Nothing here calls the model, so every fatal precondition is
    /// reported before the first request goes out.
    async fn prepare(
        &self,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
        calls: &Arc<AtomicUsize>,
        metadata: &mut PipelineMetadata,
    ) -> Result<(Arc<[ContributionItem]>, StageContext), PipelineError> {
        let stage = PipelineStage::Normalize;
        options.normalize.validate()?;
        self.progress.progress(stage, 0, 1, stage.label());
        let items = normalize(contributions, &options.normalize)?;
        metadata.total_contributions = items.len();
        self.progress.progress(
            stage,
            1,
            1,
            format!("Prepared {} contribution(s)", items.len()),
        );
        if items.is_empty() {
            return Err(PipelineError::NoContributions);
        }

        let credential = self.credentials.resolve(user_id).await?;
        let session = LlmSession::new(Arc::clone(&self.backend), credential)
            .with_cache(Arc::clone(&self.cache))
            .with_retries(self.max_retries, self.backoff)
            .with_call_counter(Arc::clone(calls));
        tracing::info!(items = items.len(), model = session.model(), "starting analysis");

        let scope = StageContext {
            session: Arc::new(session),
            context: Arc::new(options.context.clone()),
            rag_context: options
                .rag_context
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Arc::from),
        };
        Ok((items.into(), scope))
    }

    /// Fails with `Cancelled` if the run was cancelled before `stage`.
    /// `completed` items made it through every earlier stage.
    fn checkpoint(
        &self,
        stage: PipelineStage,
        completed: usize,
        total: usize,
    ) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage,
                completed,
                skipped: total.saturating_sub(completed),
            });
        }
        Ok(())
    }

    async fn try_full(
        &self,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
        calls: &Arc<AtomicUsize>,
        metadata: &mut PipelineMetadata,
    ) -> Result<ConsolidatedReport, PipelineError> {
        let (items, scope) = self
            .prepare(contributions, user_id, options, calls, metadata)
            .await?;
        let total = items.len();
        let pool = WorkerPool::new(
            options.max_concurrent,
            self.cancel.clone(),
            Arc::clone(&self.progress),
        );

        let stage1: Arc<[Stage1Output]> = extraction::extract_batch(&scope, &pool, &items)
            .await?
            .into();
        metadata.step1_completed_at = Some(timestamp());
        tracing::info!(
            failed = stage1.iter().filter(|s| s.is_failed()).count(),
            "extraction done"
        );

        let stage2: Arc<[Stage2Output]> =
            patterns::recognize_batch(&scope, &pool, &items, &stage1)
                .await?
                .into();
        metadata.step2_completed_at = Some(timestamp());
        tracing::info!(
            failed = stage2.iter().filter(|s| s.is_failed()).count(),
            "pattern recognition done"
        );

        let stage3 = reporting::report_batch(&scope, &pool, &items, &stage1, &stage2).await?;
        metadata.step3_completed_at = Some(timestamp());
        ensure_len(PipelineStage::Consolidation, total, stage3.len())?;
        metadata.failed_contributions = (0..total)
            .filter(|&i| stage1[i].is_failed() || stage2[i].is_failed() || stage3[i].failed)
            .count();

        self.checkpoint(PipelineStage::Consolidation, total, total)?;
        let analysis = analysis::build_analysis(&items, &stage1, &stage2);
        let report =
            consolidate::consolidate(&scope, stage3, &stage2, analysis, &self.progress).await;
        metadata.processed_contributions = total;
        Ok(report)
    }

    async fn try_optimized(
        &self,
        contributions: &ContributionSet,
        user_id: &str,
        options: &PipelineOptions,
        calls: &Arc<AtomicUsize>,
        metadata: &mut PipelineMetadata,
    ) -> Result<ConsolidatedReport, PipelineError> {
        let (items, scope) = self
            .prepare(contributions, user_id, options, calls, metadata)
            .await?;
        self.checkpoint(PipelineStage::SingleCall, 0, items.len())?;

        let outcome = optimized::analyze(&scope, &items, &self.progress).await?;
        metadata.failed_contributions = outcome.failed_items;
        metadata.processed_contributions = items.len();
        Ok(outcome.report)
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
