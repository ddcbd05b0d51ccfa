//! Per-item outputs of the three LLM stages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::contribution::{ContributionItem, ContributionKind};

/// Summary used for a Stage 1 placeholder.
pub const FAILED_SUMMARY: &str = "Failed to analyze";

/// Prefix marking a Stage 2 placeholder's `architectural_impact`.
pub const ERROR_PREFIX: &str = "Error:";

/// How a file was affected by a contribution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ChangeType {
    #[strum(to_string = "Create", serialize = "created", serialize = "add", serialize = "added")]
    Create,
    #[default]
    #[strum(to_string = "Update", serialize = "updated", serialize = "modify", serialize = "modified")]
    Update,
    #[strum(to_string = "Delete", serialize = "deleted", serialize = "remove", serialize = "removed")]
    Delete,
    #[strum(to_string = "Refactor", serialize = "refactored", serialize = "rename", serialize = "renamed")]
    Refactor,
}

/// One file-level change identified in Stage 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub file_path: String,
    pub change_type: ChangeType,
    pub technical_description: String,
}

/// Stage 1: what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage1Output {
    pub summary_high_level: String,
    pub changes: Vec<FileChange>,
    pub new_dependencies: Vec<String>,
    pub rag_utilization: String,
    /// Set only on placeholders, never inferred from the text fields.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Stage1Output {
    /// Degraded stand-in for an item whose extraction failed.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            summary_high_level: FAILED_SUMMARY.to_string(),
            changes: Vec::new(),
            new_dependencies: Vec::new(),
            rag_utilization: format!("{ERROR_PREFIX} {error}"),
            failed: true,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// Confidence attached to a recognized design pattern.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// Lenient parse used on model output. Anything unrecognized is `Low`.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim() {
            "High" | "high" | "HIGH" => Confidence::High,
            "Medium" | "medium" | "MEDIUM" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Whether this confidence counts toward aggregate pattern frequencies.
    pub fn counts_toward_aggregation(self) -> bool {
        matches!(self, Confidence::High | Confidence::Medium)
    }
}

/// A technology used by a contribution and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechUsage {
    pub name: String,
    pub purpose: String,
}

/// A design pattern recognized in a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignPattern {
    pub name: String,
    pub confidence: Confidence,
    pub justification: String,
}

/// Stage 2: how and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage2Output {
    pub tech_stack_utilized: Vec<TechUsage>,
    pub design_patterns: Vec<DesignPattern>,
    pub key_decisions: Vec<String>,
    pub architectural_impact: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Stage2Output {
    /// Degraded stand-in for an item whose pattern recognition failed.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            architectural_impact: format!("{ERROR_PREFIX} {error}"),
            failed: true,
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// Identifying block attached to each Stage 3 report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionMetadata {
    pub kind: ContributionKind,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl From<&ContributionItem> for ContributionMetadata {
    fn from(item: &ContributionItem) -> Self {
        Self {
            kind: item.kind,
            identifier: item.identifier(),
            title: item.metadata.title.clone(),
            author: item.metadata.author.clone(),
            date: item.metadata.date.clone(),
        }
    }
}

/// Stage 3: the audience-tailored markdown report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage3Output {
    pub markdown_report: String,
    pub contribution_metadata: ContributionMetadata,
    /// Set when the report is an error placeholder rather than model output.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Stage3Output {
    /// Error report for an item whose rendering failed.
    pub fn failed(item: &ContributionItem, error: impl std::fmt::Display) -> Self {
        let metadata = ContributionMetadata::from(item);
        Self {
            markdown_report: format!(
                "## Report unavailable for {}\n\n> Report generation failed: {error}\n",
                metadata.identifier
            ),
            contribution_metadata: metadata,
            failed: true,
        }
    }
}
