//! JSON output renderer.
//!
//! Emits the caller-facing result shape verbatim:
//! `{"success": ..., "consolidatedReport": {...}, "metadata": {...}}`.

use crate::models::PipelineResult;
use crate::output::OutputRenderer;

/// JSON output renderer.
pub struct JsonRenderer;

impl OutputRenderer for JsonRenderer {
    fn render(&self, result: &PipelineResult) -> String {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsolidatedReport, PipelineMetadata};

    #[test]
    fn render_success() {
        let report = ConsolidatedReport {
            overall_summary: "Great work".into(),
            ..Default::default()
        };
        let metadata = PipelineMetadata {
            total_contributions: 2,
            llm_calls: 7,
            ..Default::default()
        };
        let output = JsonRenderer.render(&PipelineResult::succeeded(report, metadata));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["consolidatedReport"]["overallSummary"], "Great work");
        assert_eq!(parsed["metadata"]["llmCalls"], 7);
        assert!(parsed.get("error").is_none());
    }

    #[test]
    fn render_failure() {
        let output = JsonRenderer.render(&PipelineResult::failed(
            "no contributions",
            PipelineMetadata::default(),
        ));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "no contributions");
        assert!(parsed.get("consolidatedReport").is_none());
    }
}
