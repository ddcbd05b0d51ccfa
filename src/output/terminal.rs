//! Terminal renderer: styled flowing text, no tables.

use colored::Colorize;

use crate::models::{NameCount, PipelineResult};
use crate::output::OutputRenderer;

/// Terminal output renderer with colored, flowing text.
pub struct TerminalRenderer;

fn joined(items: &[NameCount]) -> String {
    items
        .iter()
        .map(|n| format!("{} ({})", n.name, n.count))
        .collect::<Vec<_>>()
        .join(", ")
}

impl OutputRenderer for TerminalRenderer {
    fn render(&self, result: &PipelineResult) -> String {
        let Some(report) = &result.consolidated_report else {
            return format!(
                " {} {}\n",
                "✖".red().bold(),
                result.error.as_deref().unwrap_or("analysis failed")
            );
        };

        let mut output = String::new();
        output.push_str(&format!("{}\n\n", "Executive summary".bold().underline()));
        output.push_str(report.overall_summary.trim());
        output.push_str("\n\n");

        let insights = &report.aggregated_insights;
        if !insights.top_technologies.is_empty() {
            output.push_str(&format!(
                " {} {}\n",
                "Technologies:".cyan().bold(),
                joined(&insights.top_technologies)
            ));
        }
        if !insights.top_patterns.is_empty() {
            output.push_str(&format!(
                " {} {}\n",
                "Patterns:".cyan().bold(),
                joined(&insights.top_patterns)
            ));
        }
        for achievement in &insights.key_achievements {
            output.push_str(&format!("   {} {}\n", "→".cyan(), achievement));
        }
        output.push('\n');

        for item in &report.individual_reports {
            let meta = &item.contribution_metadata;
            let icon = if item.failed {
                "✖".red().bold().to_string()
            } else {
                "✔".green().bold().to_string()
            };
            let title = meta.title.as_deref().unwrap_or("");
            output.push_str(&format!(
                " {} {} {} {}\n",
                icon,
                meta.kind.to_string().dimmed(),
                meta.identifier.bold(),
                title
            ));
        }

        let meta = &result.metadata;
        output.push_str(&format!("{}\n", "───────────────────────────────────".dimmed()));
        let degraded = if meta.failed_contributions > 0 {
            format!("{} degraded", meta.failed_contributions)
                .yellow()
                .bold()
                .to_string()
        } else {
            "0 degraded".to_string()
        };
        output.push_str(&format!(
            " {} contributions, {}, {} LLM calls in {:.1}s\n",
            meta.processed_contributions.to_string().bold(),
            degraded,
            meta.llm_calls,
            meta.total_duration_ms as f64 / 1000.0,
        ));
        output.push_str(&format!(
            " {}\n",
            crate::constants::AI_DISCLOSURE.dimmed()
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConsolidatedReport, ContributionKind, ContributionMetadata, PipelineMetadata,
        Stage3Output,
    };

    #[test]
    fn render_failure() {
        let output = TerminalRenderer.render(&PipelineResult::failed(
            "no contributions to analyze",
            PipelineMetadata::default(),
        ));
        assert!(output.contains("no contributions to analyze"));
    }

    #[test]
    fn render_report() {
        let report = ConsolidatedReport {
            overall_summary: "Shipped a cache.".into(),
            individual_reports: vec![Stage3Output {
                markdown_report: "# Cache".into(),
                contribution_metadata: ContributionMetadata {
                    kind: ContributionKind::PullRequest,
                    identifier: "#12".into(),
                    title: Some("Add cache".into()),
                    author: None,
                    date: None,
                },
                failed: false,
            }],
            ..Default::default()
        };
        let metadata = PipelineMetadata {
            processed_contributions: 1,
            failed_contributions: 1,
            ..Default::default()
        };
        let output = TerminalRenderer.render(&PipelineResult::succeeded(report, metadata));
        // Content may be wrapped in ANSI color codes.
        assert!(output.contains("Shipped a cache."));
        assert!(output.contains("#12"));
        assert!(output.contains("Add cache"));
        assert!(output.contains("degraded"));
    }
}
