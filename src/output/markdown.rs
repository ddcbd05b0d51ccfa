//! Markdown renderer: one self-contained document per run.

use std::fmt::Write as _;

use crate::models::{NameCount, PipelineResult};
use crate::output::OutputRenderer;

/// Markdown document renderer.
pub struct MarkdownRenderer;

fn ranked(out: &mut String, heading: &str, items: &[NameCount]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(out, "### {heading}\n\n");
    for item in items {
        let _ = writeln!(out, "- {} ({})", item.name, item.count);
    }
    out.push('\n');
}

impl OutputRenderer for MarkdownRenderer {
    fn render(&self, result: &PipelineResult) -> String {
        let Some(report) = &result.consolidated_report else {
            return format!(
                "# Contribution analysis failed\n\n> {}\n",
                result.error.as_deref().unwrap_or("unknown error")
            );
        };

        let mut out = String::from("# Contribution analysis\n\n");
        let _ = write!(out, "## Executive summary\n\n{}\n\n", report.overall_summary.trim());

        let insights = &report.aggregated_insights;
        out.push_str("## Highlights\n\n");
        ranked(&mut out, "Technologies", &insights.top_technologies);
        ranked(&mut out, "Design patterns", &insights.top_patterns);
        if !insights.key_achievements.is_empty() {
            out.push_str("### Key achievements\n\n");
            for achievement in &insights.key_achievements {
                let _ = writeln!(out, "- {achievement}");
            }
            out.push('\n');
        }

        let rich = &report.rich_analysis_result;
        let _ = write!(
            out,
            "### Scope\n\n| Pull requests | Commits | Low | Medium | High |\n\
             |---|---|---|---|---|\n| {} | {} | {} | {} | {} |\n\n",
            rich.total_prs,
            rich.total_commits,
            rich.complexity_distribution.low,
            rich.complexity_distribution.medium,
            rich.complexity_distribution.high,
        );

        out.push_str("## Contributions\n\n");
        for (i, item) in report.individual_reports.iter().enumerate() {
            if i > 0 {
                out.push_str("\n---\n\n");
            }
            out.push_str(item.markdown_report.trim());
            out.push('\n');
        }

        let meta = &result.metadata;
        let _ = write!(
            out,
            "\n---\n\n_{} of {} contribution(s) analyzed, {} degraded, {} LLM call(s), {:.1}s. {}_\n",
            meta.processed_contributions,
            meta.total_contributions,
            meta.failed_contributions,
            meta.llm_calls,
            meta.total_duration_ms as f64 / 1000.0,
            crate::constants::AI_DISCLOSURE,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AggregatedInsights, ConsolidatedReport, ContributionKind, ContributionMetadata,
        PipelineMetadata, Stage3Output,
    };

    fn report_for(id: &str, body: &str) -> Stage3Output {
        Stage3Output {
            markdown_report: body.into(),
            contribution_metadata: ContributionMetadata {
                kind: ContributionKind::PullRequest,
                identifier: id.into(),
                title: None,
                author: None,
                date: None,
            },
            failed: false,
        }
    }

    #[test]
    fn renders_sections_in_order() {
        let report = ConsolidatedReport {
            overall_summary: "Solid quarter.".into(),
            individual_reports: vec![report_for("#1", "# First"), report_for("#2", "# Second")],
            aggregated_insights: AggregatedInsights {
                total_contributions: 2,
                top_technologies: vec![NameCount { name: "Rust".into(), count: 2 }],
                top_patterns: vec![],
                key_achievements: vec!["Halved build time".into()],
            },
            ..Default::default()
        };
        let metadata = PipelineMetadata {
            total_contributions: 2,
            processed_contributions: 2,
            llm_calls: 7,
            total_duration_ms: 1500,
            ..Default::default()
        };
        let out = MarkdownRenderer.render(&PipelineResult::succeeded(report, metadata));

        let summary = out.find("Solid quarter.").unwrap();
        let first = out.find("# First").unwrap();
        let second = out.find("# Second").unwrap();
        assert!(summary < first && first < second);
        assert!(out.contains("- Rust (2)"));
        assert!(!out.contains("### Design patterns"));
        assert!(out.contains("- Halved build time"));
        assert!(out.contains("7 LLM call(s), 1.5s"));
    }

    #[test]
    fn renders_failure() {
        let out = MarkdownRenderer.render(&PipelineResult::failed(
            "credential unavailable",
            PipelineMetadata::default(),
        ));
        assert!(out.starts_with("# Contribution analysis failed"));
        assert!(out.contains("> credential unavailable"));
    }
}
