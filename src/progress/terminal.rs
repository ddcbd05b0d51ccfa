//! Live stage display for interactive terminals.
//!
//! Renders one line per pipeline stage with colored spinners and
//! checkmarks on stderr; silenced with `--no-progress`.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use colored::Colorize;
use indexmap::IndexMap;

use super::{PipelineStage, ProgressEvent, ProgressSink, SinkError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StageStatus {
    Running { current: usize, total: usize },
    Done { total: usize },
}

#[derive(Default)]
struct TerminalState {
    /// Stages in the order they were first seen.
    stages: IndexMap<PipelineStage, StageStatus>,
    rendered_lines: usize,
}

/// Renders progress events to stderr.
pub struct TerminalProgress {
    inner: Mutex<TerminalState>,
    enabled: bool,
}

impl TerminalProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Mutex::new(TerminalState::default()),
            enabled,
        }
    }

    fn apply(state: &mut TerminalState, event: &ProgressEvent) {
        match event {
            ProgressEvent::Progress {
                step,
                current,
                total,
                ..
            } => {
                // Starting a stage implies every earlier one is finished.
                for status in state.stages.values_mut() {
                    if let StageStatus::Running { total, .. } = *status {
                        *status = StageStatus::Done { total };
                    }
                }
                let status = if current >= total && *total > 0 {
                    StageStatus::Done { total: *total }
                } else {
                    StageStatus::Running {
                        current: *current,
                        total: *total,
                    }
                };
                state.stages.insert(*step, status);
            }
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. } => {
                for status in state.stages.values_mut() {
                    if let StageStatus::Running { total, .. } = *status {
                        *status = StageStatus::Done { total };
                    }
                }
            }
        }
    }

    fn render(state: &mut TerminalState, event: &ProgressEvent) {
        let stderr = io::stderr();
        let mut handle = stderr.lock();

        Self::clear_lines(&mut handle, state.rendered_lines);

        let mut lines = 0;
        for (stage, status) in &state.stages {
            let (icon, detail) = match status {
                StageStatus::Running { current, total } => (
                    "◌".cyan().bold().to_string(),
                    format!("{current}/{total}").cyan().to_string(),
                ),
                StageStatus::Done { total } => (
                    "✔".green().bold().to_string(),
                    format!("{total}/{total}").green().to_string(),
                ),
            };
            let _ = writeln!(handle, "  {icon} {} {detail}", stage.label().dimmed());
            lines += 1;
        }

        match event {
            ProgressEvent::Complete { metadata, .. } => {
                let _ = writeln!(
                    handle,
                    "  {} Analyzed {} contribution(s) with {} LLM call(s) in {:.1}s",
                    "▸".cyan().bold(),
                    metadata.processed_contributions,
                    metadata.llm_calls,
                    metadata.total_duration_ms as f64 / 1000.0,
                );
                state.rendered_lines = 0;
            }
            ProgressEvent::Error { error } => {
                let _ = writeln!(handle, "  {} {}", "✖".red().bold(), error.red());
                state.rendered_lines = 0;
            }
            ProgressEvent::Progress { .. } => state.rendered_lines = lines,
        }
        let _ = handle.flush();
    }

    /// Move cursor up and clear `n` lines.
    fn clear_lines(handle: &mut impl Write, n: usize) {
        for _ in 0..n {
            let _ = write!(handle, "\x1b[1A\x1b[2K");
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::apply(&mut state, event);
        if self.enabled {
            Self::render(&mut state, event);
        }
        Ok(())
    }
}
