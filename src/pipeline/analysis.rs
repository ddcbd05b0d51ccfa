//! Deterministic rich analysis built from Stage 1 and Stage 2 outputs.
//!
//! No network access; everything here is a pure function of its inputs.

use crate::models::{
    AnalysisResult, CommitAnalysis, Complexity, ComplexityDistribution, ContributionItem,
    ContributionKind, PrAnalysis, Stage1Output, Stage2Output,
};

use super::consolidate::{top_patterns, top_technologies};

/// Build the per-item projections, complexity histogram and top lists.
///
/// The three slices are read index for index; callers validate lengths.
pub fn build_analysis(
    items: &[ContributionItem],
    stage1: &[Stage1Output],
    stage2: &[Stage2Output],
) -> AnalysisResult {
    let mut result = AnalysisResult::default();
    let mut distribution = ComplexityDistribution::default();

    for ((item, s1), s2) in items.iter().zip(stage1).zip(stage2) {
        let files_changed = s1.changes.len();
        let complexity = Complexity::from_file_count(files_changed);
        distribution.record(complexity);
        if s1.is_failed() || s2.is_failed() {
            result.failed_items += 1;
        }

        let technologies = s2.tech_stack_utilized.iter().map(|t| t.name.clone()).collect();
        let patterns = s2.design_patterns.iter().map(|p| p.name.clone()).collect();

        match item.kind {
            ContributionKind::PullRequest => result.pr_analyses.push(PrAnalysis {
                pr_number: item.metadata.pr_number,
                title: item.headline().to_string(),
                author: item.metadata.author.clone(),
                date: item.metadata.date.clone(),
                summary: s1.summary_high_level.clone(),
                files_changed,
                technologies,
                patterns,
                key_decisions: s2.key_decisions.clone(),
                architectural_impact: s2.architectural_impact.clone(),
                complexity,
            }),
            ContributionKind::Commit => result.commit_analyses.push(CommitAnalysis {
                sha: item.metadata.sha.clone(),
                message: item.commit_messages.clone(),
                author: item.metadata.author.clone(),
                date: item.metadata.date.clone(),
                summary: s1.summary_high_level.clone(),
                files_changed,
                technologies,
                patterns,
                new_dependencies: s1.new_dependencies.clone(),
                complexity,
            }),
        }
    }

    result.total_prs = result.pr_analyses.len();
    result.total_commits = result.commit_analyses.len();
    result.complexity_distribution = distribution;
    result.top_technologies = top_technologies(stage2);
    result.top_patterns = top_patterns(stage2);
    result
}
