//! Contribution records: the raw scan payload and the normalized item.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Contribution categories a caller can ask for.
///
/// Only `Commit` and `PullRequest` convert into [`ContributionItem`]s;
/// the other two are rejected during option validation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContributionType {
    #[serde(rename = "pr", alias = "pull_request")]
    #[strum(to_string = "pr", serialize = "pull_request")]
    PullRequest,
    Commit,
    Issue,
    Release,
}

/// A single file touched by a commit, as reported by the source host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawFileStat {
    #[serde(alias = "path")]
    pub filename: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    /// Unified patch text when the host returned one.
    pub patch: Option<String>,
}

/// A commit record from a contribution scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawCommit {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub repository: Option<String>,
    pub files: Vec<RawFileStat>,
}

/// A pull request record from a contribution scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: Option<String>,
    #[serde(alias = "mergedAt")]
    pub created_at: Option<String>,
    pub repository: Option<String>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    /// Messages of the commits on the PR branch, oldest first.
    pub commit_messages: Vec<String>,
    /// File-level diff, present only when the scan cached it.
    pub diff: Option<String>,
}

/// The cached output of a contribution scan, as consumed by the pipeline.
///
/// Issues and releases are carried so the payload round-trips, but the
/// pipeline never converts them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContributionSet {
    pub commits: Vec<RawCommit>,
    #[serde(alias = "prs", alias = "pull_requests")]
    pub pull_requests: Vec<RawPullRequest>,
    pub issues: Vec<serde_json::Value>,
    pub releases: Vec<serde_json::Value>,
}

/// Kind of a normalized contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContributionKind {
    Commit,
    PullRequest,
}

/// Identifying metadata carried alongside an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// The uniform unit of work fed through all three stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionItem {
    pub kind: ContributionKind,
    pub commit_messages: String,
    pub raw_diff: String,
    pub metadata: ItemMetadata,
}

impl ContributionItem {
    /// Short human identifier: `#<number>` for PRs, 7-char SHA for commits.
    pub fn identifier(&self) -> String {
        match self.kind {
            ContributionKind::PullRequest => match self.metadata.pr_number {
                Some(n) => format!("#{n}"),
                None => "#?".to_string(),
            },
            ContributionKind::Commit => match self.metadata.sha.as_deref() {
                Some(sha) if !sha.is_empty() => sha.chars().take(7).collect(),
                _ => "unknown".to_string(),
            },
        }
    }

    /// Headline used in prompts and reports.
    pub fn headline(&self) -> &str {
        self.metadata
            .title
            .as_deref()
            .or_else(|| self.commit_messages.lines().next())
            .unwrap_or("")
    }
}
