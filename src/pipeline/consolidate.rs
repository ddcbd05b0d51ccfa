//! Aggregation and the executive summary.
//!
//! Frequency counts are built in a single pass after every batch has
//! finished, so no two workers ever write the same map. Ranking is by
//! count descending with ties kept in first-seen order.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::constants::{MAX_KEY_ACHIEVEMENTS, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE, TOP_N};
use crate::models::{
    AggregatedInsights, AnalysisContext, AnalysisResult, ConsolidatedReport, NameCount,
    Stage2Output, Stage3Output,
};
use crate::parse::ParseError;
use crate::prompts;
use crate::progress::PipelineStage;
use crate::providers::CompletionRequest;

use super::StageContext;

/// Count names and keep the `TOP_N` most frequent.
///
/// Names match exactly (case-sensitive). The sort is stable, so equal
/// counts stay in the order the names were first seen.
pub fn rank<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<NameCount> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<NameCount> = counts
        .into_iter()
        .map(|(name, count)| NameCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_N);
    ranked
}

pub fn top_technologies(stage2: &[Stage2Output]) -> Vec<NameCount> {
    rank(
        stage2
            .iter()
            .flat_map(|s| &s.tech_stack_utilized)
            .map(|t| t.name.as_str()),
    )
}

/// Only High and Medium confidence patterns are counted.
pub fn top_patterns(stage2: &[Stage2Output]) -> Vec<NameCount> {
    rank(
        stage2
            .iter()
            .flat_map(|s| &s.design_patterns)
            .filter(|p| p.confidence.counts_toward_aggregation())
            .map(|p| p.name.as_str()),
    )
}

/// The first few non-error architectural impacts, in item order.
pub fn key_achievements(stage2: &[Stage2Output]) -> Vec<String> {
    stage2
        .iter()
        .filter(|s| !s.is_failed())
        .map(|s| s.architectural_impact.trim())
        .filter(|impact| !impact.is_empty())
        .take(MAX_KEY_ACHIEVEMENTS)
        .map(str::to_string)
        .collect()
}

pub fn aggregate_insights(stage2: &[Stage2Output], total_contributions: usize) -> AggregatedInsights {
    AggregatedInsights {
        total_contributions,
        top_technologies: top_technologies(stage2),
        top_patterns: top_patterns(stage2),
        key_achievements: key_achievements(stage2),
    }
}

/// Summary built without the model, used when the summary call fails.
pub fn fallback_summary(insights: &AggregatedInsights) -> String {
    let mut out = format!(
        "## Summary\n\nAnalyzed {} contribution(s).\n",
        insights.total_contributions
    );
    let list = |items: &[NameCount]| {
        items
            .iter()
            .map(|n| format!("{} ({})", n.name, n.count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !insights.top_technologies.is_empty() {
        let _ = write!(
            out,
            "\n**Technologies:** {}\n",
            list(&insights.top_technologies)
        );
    }
    if !insights.top_patterns.is_empty() {
        let _ = write!(out, "\n**Design patterns:** {}\n", list(&insights.top_patterns));
    }
    if !insights.key_achievements.is_empty() {
        out.push_str("\n**Key achievements:**\n\n");
        for achievement in &insights.key_achievements {
            let _ = writeln!(out, "- {achievement}");
        }
    }
    out
}

const PERSONA: &str = "You are a career coach with deep engineering experience. You write \
     executive summaries of a developer's body of work.";

const RULES: &str = "Write a 3 to 4 paragraph executive summary in markdown from the aggregated \
     findings. Lead with the strongest themes, ground every claim in the data, and keep it \
     readable by a non-specialist. Return only the markdown.";

pub fn summary_system_prompt(context: &AnalysisContext) -> String {
    prompts::system_prompt(PERSONA, context, RULES)
}

pub fn summary_user_prompt(insights: &AggregatedInsights, analysis: &AnalysisResult) -> String {
    let mut prompt = format!(
        "## Scope\n\n{} contribution(s): {} pull request(s), {} commit(s).\n\
         Complexity: {} low, {} medium, {} high.\n\n",
        insights.total_contributions,
        analysis.total_prs,
        analysis.total_commits,
        analysis.complexity_distribution.low,
        analysis.complexity_distribution.medium,
        analysis.complexity_distribution.high,
    );
    prompt.push_str("## Technologies\n\n");
    for tech in &insights.top_technologies {
        let _ = writeln!(prompt, "- {} ({})", tech.name, tech.count);
    }
    prompt.push_str("\n## Design patterns\n\n");
    for pattern in &insights.top_patterns {
        let _ = writeln!(prompt, "- {} ({})", pattern.name, pattern.count);
    }
    prompt.push_str("\n## Key achievements\n\n");
    for achievement in &insights.key_achievements {
        let _ = writeln!(prompt, "- {achievement}");
    }
    prompt
}

fn parse_summary(text: &str) -> Result<String, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ParseError::Empty)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Merge per-item outputs into the final report.
///
/// Makes exactly one LLM call for the summary and never fails: if that
/// call does, the templated summary is used instead.
pub async fn consolidate(
    scope: &StageContext,
    stage3: Vec<Stage3Output>,
    stage2: &[Stage2Output],
    analysis: AnalysisResult,
    progress: &crate::progress::ProgressReporter,
) -> ConsolidatedReport {
    let stage = PipelineStage::Consolidation;
    progress.progress(stage, 0, 1, stage.label());

    let insights = aggregate_insights(stage2, stage3.len());
    let request = CompletionRequest::new(
        summary_system_prompt(&scope.context),
        summary_user_prompt(&insights, &analysis),
    )
    .temperature(SUMMARY_TEMPERATURE)
    .max_tokens(SUMMARY_MAX_TOKENS);

    let overall_summary = match scope.session.complete_with(&request, parse_summary).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(error = %e, "executive summary failed; using templated summary");
            fallback_summary(&insights)
        }
    };
    progress.progress(stage, 1, 1, "Executive summary ready");

    ConsolidatedReport {
        overall_summary,
        individual_reports: stage3,
        aggregated_insights: insights,
        rich_analysis_result: analysis,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{Confidence, DesignPattern, TechUsage};

    fn nc(name: &str, count: usize) -> NameCount {
        NameCount {
            name: name.into(),
            count,
        }
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let names = ["A", "B", "C", "A", "B", "C", "A", "B", "A", "B", "C", "A", "B"];
        assert_eq!(rank(names), vec![nc("A", 5), nc("B", 5), nc("C", 3)]);
    }

    #[test]
    fn later_names_can_overtake() {
        assert_eq!(rank(["x", "y", "y"]), vec![nc("y", 2), nc("x", 1)]);
    }

    #[test]
    fn rank_truncates_and_is_case_sensitive() {
        let names: Vec<String> = (0..15).map(|i| format!("t{i}")).collect();
        assert_eq!(rank(names.iter().map(String::as_str)).len(), TOP_N);
        assert_eq!(rank(["Rust", "rust"]), vec![nc("Rust", 1), nc("rust", 1)]);
    }

    fn s2(impact: &str, patterns: &[(&str, Confidence)]) -> Stage2Output {
        Stage2Output {
            tech_stack_utilized: vec![TechUsage {
                name: "Rust".into(),
                purpose: String::new(),
            }],
            design_patterns: patterns
                .iter()
                .map(|(name, confidence)| DesignPattern {
                    name: name.to_string(),
                    confidence: *confidence,
                    justification: String::new(),
                })
                .collect(),
            key_decisions: vec![],
            architectural_impact: impact.into(),
            failed: false,
        }
    }

    #[test]
    fn low_confidence_excluded_from_top_patterns() {
        let stage2 = vec![s2(
            "x",
            &[("Observer", Confidence::Low), ("Builder", Confidence::Medium)],
        )];
        assert_eq!(top_patterns(&stage2), vec![nc("Builder", 1)]);
    }

    #[test]
    fn key_achievements_skip_errors_and_blanks() {
        let mut stage2 = vec![
            Stage2Output::failed("timeout"),
            s2("", &[]),
            s2("First", &[]),
        ];
        stage2.extend((0..6).map(|i| s2(&format!("Impact {i}"), &[])));
        let achievements = key_achievements(&stage2);
        assert_eq!(achievements.len(), MAX_KEY_ACHIEVEMENTS);
        assert_eq!(achievements[0], "First");
        assert_eq!(achievements[4], "Impact 3");
    }

    #[test]
    fn fallback_summary_lists_aggregates() {
        let insights = AggregatedInsights {
            total_contributions: 2,
            top_technologies: vec![nc("Rust", 2)],
            top_patterns: vec![nc("Builder", 1)],
            key_achievements: vec!["Cut latency".into()],
        };
        let summary = fallback_summary(&insights);
        assert!(summary.contains("Analyzed 2 contribution(s)"));
        assert!(summary.contains("Rust (2)"));
        assert!(summary.contains("Builder (1)"));
        assert!(summary.contains("- Cut latency"));
    }

    #[test]
    fn fallback_summary_for_empty_insights() {
        let summary = fallback_summary(&AggregatedInsights::default());
        assert!(summary.contains("Analyzed 0 contribution(s)"));
        assert!(!summary.contains("Technologies"));
    }
}
