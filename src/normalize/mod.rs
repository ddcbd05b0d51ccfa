//! Contribution normalization.
//!
//! Turns a cached scan payload into the uniform [`ContributionItem`] list
//! the stages consume. Pure and deterministic: the same set and options
//! always produce the same items in the same order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_MAX_COMMITS, DEFAULT_MAX_PRS};
use crate::models::{
    ContributionItem, ContributionKind, ContributionSet, ContributionType, ItemMetadata,
    RawCommit, RawPullRequest,
};

/// Errors from option validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("contribution type '{0}' is not supported yet; use 'commit' and/or 'pr'")]
    UnsupportedType(ContributionType),

    #[error("no contribution types selected")]
    NoTypes,
}

/// Selection and truncation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NormalizeOptions {
    pub max_commits: usize,
    #[serde(alias = "maxPRs")]
    pub max_prs: usize,
    pub max_issues: usize,
    pub max_releases: usize,
    /// Types to include, processed in the listed order.
    pub contribution_types: Vec<ContributionType>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_commits: DEFAULT_MAX_COMMITS,
            max_prs: DEFAULT_MAX_PRS,
            max_issues: 0,
            max_releases: 0,
            contribution_types: vec![ContributionType::Commit, ContributionType::PullRequest],
        }
    }
}

impl NormalizeOptions {
    /// Reject selections the normalizer cannot honor.
    ///
    /// Issues and releases have limits in the option set but no
    /// conversion, so asking for them is an error rather than a silent
    /// empty result.
    pub fn validate(&self) -> Result<(), NormalizeError> {
        if self.contribution_types.is_empty() {
            return Err(NormalizeError::NoTypes);
        }
        for ty in &self.contribution_types {
            if matches!(ty, ContributionType::Issue | ContributionType::Release) {
                return Err(NormalizeError::UnsupportedType(*ty));
            }
        }
        Ok(())
    }
}

/// Normalize a contribution set into pipeline items.
pub fn normalize(
    contributions: &ContributionSet,
    options: &NormalizeOptions,
) -> Result<Vec<ContributionItem>, NormalizeError> {
    options.validate()?;

    let mut items = Vec::new();
    let mut seen = Vec::with_capacity(options.contribution_types.len());

    for ty in &options.contribution_types {
        if seen.contains(ty) {
            continue;
        }
        seen.push(*ty);

        match ty {
            ContributionType::Commit => items.extend(
                contributions
                    .commits
                    .iter()
                    .take(options.max_commits)
                    .map(commit_to_item),
            ),
            ContributionType::PullRequest => items.extend(
                contributions
                    .pull_requests
                    .iter()
                    .take(options.max_prs)
                    .map(pull_request_to_item),
            ),
            // Rejected by validate().
            ContributionType::Issue | ContributionType::Release => {}
        }
    }

    Ok(items)
}

fn commit_to_item(commit: &RawCommit) -> ContributionItem {
    ContributionItem {
        kind: ContributionKind::Commit,
        commit_messages: commit.message.trim().to_string(),
        raw_diff: commit_diff(commit),
        metadata: ItemMetadata {
            sha: non_empty(&commit.sha),
            pr_number: None,
            title: commit.message.lines().next().and_then(non_empty),
            author: commit.author.clone(),
            date: commit.date.clone(),
        },
    }
}

fn pull_request_to_item(pr: &RawPullRequest) -> ContributionItem {
    let mut messages = String::new();
    messages.push_str(pr.title.trim());
    if let Some(body) = pr.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        messages.push_str("\n\n");
        messages.push_str(body);
    }
    if !pr.commit_messages.is_empty() {
        messages.push_str("\n\nCommits:\n");
        for message in &pr.commit_messages {
            let first_line = message.lines().next().unwrap_or("").trim();
            messages.push_str(&format!("- {first_line}\n"));
        }
    }

    ContributionItem {
        kind: ContributionKind::PullRequest,
        commit_messages: messages.trim_end().to_string(),
        raw_diff: pull_request_diff(pr),
        metadata: ItemMetadata {
            sha: None,
            pr_number: Some(pr.number),
            title: non_empty(&pr.title),
            author: pr.author.clone(),
            date: pr.created_at.clone(),
        },
    }
}

/// Build diff text for a commit.
///
/// Uses per-file patches when the host returned them and falls back to a
/// synthetic hunk built from the file stats, so the result is never empty.
fn commit_diff(commit: &RawCommit) -> String {
    if commit.files.is_empty() {
        return "# No file-level changes were recorded for this commit.\n".to_string();
    }

    let mut diff = String::new();
    for file in &commit.files {
        let path = file.filename.as_str();
        diff.push_str(&format!("diff --git a/{path} b/{path}\n"));
        match file.patch.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(patch) => {
                diff.push_str(&format!("--- a/{path}\n+++ b/{path}\n"));
                diff.push_str(patch.trim_end());
                diff.push('\n');
            }
            None => {
                let status = if file.status.is_empty() {
                    "modified"
                } else {
                    file.status.as_str()
                };
                diff.push_str(&format!(
                    "--- a/{path}\n+++ b/{path}\n@@ {status}: +{} -{} @@\n",
                    file.additions, file.deletions
                ));
            }
        }
    }
    diff
}

/// Build diff text for a pull request.
///
/// The cached payload usually lacks the file-level diff; in that case a
/// placeholder with the size stats is embedded instead.
fn pull_request_diff(pr: &RawPullRequest) -> String {
    match pr.diff.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(diff) => diff.to_string(),
        None => format!(
            "# Pull request #{} diff not included in the cached contribution data.\n\
             # The full diff must be fetched separately from the source host.\n\
             # Stats: {} file(s) changed, +{} -{}\n",
            pr.number, pr.changed_files, pr.additions, pr.deletions
        ),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
