//! Aggregate report types and the caller-facing result envelope.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::stages::Stage3Output;

/// A name with an occurrence count, used for ranked frequency lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCount {
    pub name: String,
    pub count: usize,
}

/// Cross-item insights derived from Stage 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedInsights {
    pub total_contributions: usize,
    pub top_technologies: Vec<NameCount>,
    pub top_patterns: Vec<NameCount>,
    pub key_achievements: Vec<String>,
}

/// Three-way size bucket based on changed-file count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// `low` up to 3 files, `medium` up to 10, `high` beyond.
    pub fn from_file_count(files: usize) -> Self {
        if files <= 3 {
            Complexity::Low
        } else if files <= 10 {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }
}

/// Histogram of item complexity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl ComplexityDistribution {
    pub fn record(&mut self, complexity: Complexity) {
        match complexity {
            Complexity::Low => self.low += 1,
            Complexity::Medium => self.medium += 1,
            Complexity::High => self.high += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

/// Read-only projection of a pull request's Stage 1 + Stage 2 results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrAnalysis {
    pub pr_number: Option<u64>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub summary: String,
    pub files_changed: usize,
    pub technologies: Vec<String>,
    pub patterns: Vec<String>,
    pub key_decisions: Vec<String>,
    pub architectural_impact: String,
    pub complexity: Complexity,
}

/// Read-only projection of a commit's Stage 1 + Stage 2 results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAnalysis {
    pub sha: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub summary: String,
    pub files_changed: usize,
    pub technologies: Vec<String>,
    pub patterns: Vec<String>,
    pub new_dependencies: Vec<String>,
    pub complexity: Complexity,
}

/// Deterministic analytical summary built without any LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub total_prs: usize,
    pub total_commits: usize,
    pub pr_analyses: Vec<PrAnalysis>,
    pub commit_analyses: Vec<CommitAnalysis>,
    pub complexity_distribution: ComplexityDistribution,
    pub top_technologies: Vec<NameCount>,
    pub top_patterns: Vec<NameCount>,
    /// Items whose Stage 1 or Stage 2 output is a degraded placeholder.
    pub failed_items: usize,
}

/// The unit returned to the caller at the end of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub overall_summary: String,
    pub individual_reports: Vec<Stage3Output>,
    pub aggregated_insights: AggregatedInsights,
    pub rich_analysis_result: AnalysisResult,
}

/// Timing and volume metadata attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetadata {
    pub total_contributions: usize,
    pub processed_contributions: usize,
    /// Items that carry at least one degraded placeholder.
    pub failed_contributions: usize,
    pub llm_calls: usize,
    pub total_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step1_completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step2_completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step3_completed_at: Option<String>,
}

/// Caller-facing result shared by both execution strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_report: Option<ConsolidatedReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: PipelineMetadata,
}

impl PipelineResult {
    pub fn succeeded(report: ConsolidatedReport, metadata: PipelineMetadata) -> Self {
        Self {
            success: true,
            consolidated_report: Some(report),
            error: None,
            metadata,
        }
    }

    pub fn failed(error: impl Into<String>, metadata: PipelineMetadata) -> Self {
        Self {
            success: false,
            consolidated_report: None,
            error: Some(error.into()),
            metadata,
        }
    }

    /// True when the run completed but some items carry placeholders.
    pub fn is_partial(&self) -> bool {
        self.success && self.metadata.failed_contributions > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_thresholds_are_exact() {
        assert_eq!(Complexity::from_file_count(0), Complexity::Low);
        assert_eq!(Complexity::from_file_count(3), Complexity::Low);
        assert_eq!(Complexity::from_file_count(4), Complexity::Medium);
        assert_eq!(Complexity::from_file_count(10), Complexity::Medium);
        assert_eq!(Complexity::from_file_count(11), Complexity::High);
    }

    #[test]
    fn distribution_records_buckets() {
        let mut dist = ComplexityDistribution::default();
        dist.record(Complexity::Low);
        dist.record(Complexity::High);
        dist.record(Complexity::High);
        assert_eq!(dist, ComplexityDistribution { low: 1, medium: 0, high: 2 });
        assert_eq!(dist.total(), 3);
    }

    #[test]
    fn failed_result_serializes_without_report() {
        let result = PipelineResult::failed("no credential", PipelineMetadata::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no credential");
        assert!(json.get("consolidatedReport").is_none());
        assert_eq!(json["metadata"]["totalDurationMs"], 0);
    }
}
