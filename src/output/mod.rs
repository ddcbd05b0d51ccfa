//! Output renderers for a finished run: terminal, markdown, JSON.

pub mod json;
pub mod markdown;
pub mod terminal;

use crate::models::PipelineResult;

/// Trait for rendering a pipeline result to an output format.
pub trait OutputRenderer {
    /// Render the result to a string.
    fn render(&self, result: &PipelineResult) -> String;
}
