//! Single-call analysis.
//!
//! All items go into one prompt and the model answers with one document
//! holding a per-item report for each plus an overall summary. Entries can
//! come back in any order, so each carries the `contributionIndex` it was
//! given and is put back in its slot before anything else reads it.

use std::fmt::Write as _;

use crate::constants::{DIFF_SNIPPET_CHARS, OPTIMIZED_MAX_TOKENS, OPTIMIZED_TEMPERATURE};
use crate::models::{
    AnalysisContext, Confidence, ConsolidatedReport, ContributionItem, ContributionMetadata,
    DesignPattern, FileChange, Stage1Output, Stage2Output, Stage3Output, TechUsage,
};
use crate::parse::{extract_json_object, Fields, ParseError};
use crate::prompts;
use crate::progress::{PipelineStage, ProgressReporter};
use crate::providers::CompletionRequest;

use super::analysis::build_analysis;
use super::consolidate::{aggregate_insights, fallback_summary};
use super::extraction::file_changes;
use super::{StageContext, StageError};

const PERSONA: &str = "You are a principal engineer and career coach. You analyze a developer's \
     contributions and explain what they built, how, and why it matters.";

const RULES: &str = "Analyze every contribution below. For each one, report what changed, the \
     technologies and design patterns it exercises, the key decisions and the architectural \
     impact, and write a short markdown report. Then write a 3 to 4 paragraph executive summary \
     across all of them. Echo each contribution's index in `contributionIndex`.";

const MISSING: &str = "missing from the single-call response";

/// One validated per-item entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualEntry {
    /// Position in the response array, counting entries that were dropped.
    pub position: usize,
    pub index: Option<usize>,
    pub summary: String,
    pub changes: Vec<FileChange>,
    pub new_dependencies: Vec<String>,
    pub technologies: Vec<String>,
    pub design_patterns: Vec<String>,
    pub key_decisions: Vec<String>,
    pub architectural_impact: String,
    pub markdown_report: String,
}

/// The parsed single-call document, entries still in response order.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleCallResponse {
    pub overall_summary: String,
    pub entries: Vec<IndividualEntry>,
}

/// What the orchestrator needs back from a single-call run.
#[derive(Debug, Clone)]
pub struct SingleCallOutcome {
    pub report: ConsolidatedReport,
    /// Items that got a placeholder or an entry without a report.
    pub failed_items: usize,
}

pub fn system_prompt(context: &AnalysisContext) -> String {
    prompts::system_prompt(PERSONA, context, RULES)
}

pub fn user_prompt(items: &[ContributionItem], rag_context: Option<&str>) -> String {
    let mut prompt = format!("## Contributions ({})\n\n", items.len());
    for (index, item) in items.iter().enumerate() {
        let _ = write!(
            prompt,
            "### [{index}] {}\n\n{}\n\n```diff\n{}\n```\n\n",
            prompts::item_header(item),
            item.commit_messages,
            prompts::truncate_chars(&item.raw_diff, DIFF_SNIPPET_CHARS)
        );
    }
    prompt.push_str(&prompts::rag_section(rag_context));
    prompt.push_str(
        "\n## Response format\n\n\
         {\n  \"overallSummary\": \"markdown\",\n  \
         \"individualReports\": [{\n    \"contributionIndex\": 0,\n    \"summary\": \"...\",\n    \
         \"changes\": [{\"filePath\": \"...\", \"changeType\": \"Create|Update|Delete|Refactor\", \
         \"description\": \"...\"}],\n    \
         \"newDependencies\": [\"...\"],\n    \"technologies\": [\"...\"],\n    \
         \"designPatterns\": [\"...\"],\n    \"keyDecisions\": [\"...\"],\n    \
         \"architecturalImpact\": \"...\",\n    \"markdownReport\": \"markdown\"\n  }]\n}\n\n",
    );
    prompt.push_str(prompts::JSON_ONLY);
    prompt
}

fn entry(position: usize, fields: &Fields<'_>) -> Option<IndividualEntry> {
    let summary = fields.str_or_empty(&["summary", "summaryHighLevel"]);
    if summary.is_empty() {
        return None;
    }
    Some(IndividualEntry {
        position,
        index: fields.usize_opt(&["contributionIndex", "contribution_index"]),
        summary,
        changes: file_changes(fields),
        new_dependencies: fields.strings(&["newDependencies", "new_dependencies"]),
        technologies: fields.names(&["technologies", "techStackUtilized"]),
        design_patterns: fields.names(&["designPatterns", "design_patterns"]),
        key_decisions: fields.strings(&["keyDecisions", "key_decisions"]),
        architectural_impact: fields.str_or_empty(&["architecturalImpact", "architectural_impact"]),
        markdown_report: fields.str_or_empty(&["markdownReport", "markdown_report"]),
    })
}

/// Parse the single-call document.
///
/// `individualReports` must be an array. Entries without a summary are
/// dropped here and later show up as missing items.
pub fn parse_response(text: &str) -> Result<SingleCallResponse, ParseError> {
    let map = extract_json_object(text)?;
    let fields = Fields::new(&map);
    let raw = fields.required_objects(&["individualReports", "individual_reports"])?;
    let entries: Vec<IndividualEntry> = raw
        .iter()
        .enumerate()
        .filter_map(|(position, fields)| entry(position, fields))
        .collect();
    if entries.len() < raw.len() {
        tracing::warn!(
            dropped = raw.len() - entries.len(),
            "single-call entries without a summary"
        );
    }
    Ok(SingleCallResponse {
        overall_summary: fields.str_or_empty(&["overallSummary", "overall_summary"]),
        entries,
    })
}

/// Put entries back into input order.
///
/// Entries with a valid, unclaimed `contributionIndex` take that slot
/// first. The rest (no index, out of range or a duplicate) then take
/// their original response position if it is free, else the first free
/// slot. Positions count entries dropped during parsing.
/// Slots nobody claimed stay `None`.
pub fn reorder(entries: Vec<IndividualEntry>, len: usize) -> Vec<Option<IndividualEntry>> {
    let mut slots: Vec<Option<IndividualEntry>> = vec![None; len];
    let mut unplaced = Vec::new();

    for entry in entries {
        match entry.index {
            Some(i) if i < len && slots[i].is_none() => slots[i] = Some(entry),
            _ => unplaced.push(entry),
        }
    }

    for entry in unplaced {
        let position = entry.position;
        let target = if position < len && slots[position].is_none() {
            Some(position)
        } else {
            slots.iter().position(Option::is_none)
        };
        match target {
            Some(slot) => slots[slot] = Some(entry),
            None => tracing::warn!(position, "surplus single-call entry dropped"),
        }
    }
    slots
}

fn into_stage_outputs(
    entry: IndividualEntry,
    item: &ContributionItem,
) -> (Stage1Output, Stage2Output, Stage3Output) {
    let stage1 = Stage1Output {
        summary_high_level: entry.summary,
        changes: entry.changes,
        new_dependencies: entry.new_dependencies,
        rag_utilization: String::new(),
        failed: false,
    };
    let stage2 = Stage2Output {
        tech_stack_utilized: entry
            .technologies
            .into_iter()
            .map(|name| TechUsage {
                name,
                purpose: String::new(),
            })
            .collect(),
        // The single-call schema does not ask for a confidence.
        design_patterns: entry
            .design_patterns
            .into_iter()
            .map(|name| DesignPattern {
                name,
                confidence: Confidence::High,
                justification: String::new(),
            })
            .collect(),
        key_decisions: entry.key_decisions,
        architectural_impact: entry.architectural_impact,
        failed: false,
    };
    let stage3 = if entry.markdown_report.is_empty() {
        Stage3Output::failed(item, "no markdown report in the single-call response")
    } else {
        Stage3Output {
            markdown_report: entry.markdown_report,
            contribution_metadata: ContributionMetadata::from(item),
            failed: false,
        }
    };
    (stage1, stage2, stage3)
}

/// Run the single call and rebuild a full report from it.
///
/// Aggregates and the rich analysis are recomputed locally from the
/// per-item entries rather than trusted from the response.
pub async fn analyze(
    scope: &StageContext,
    items: &[ContributionItem],
    progress: &ProgressReporter,
) -> Result<SingleCallOutcome, StageError> {
    let stage = PipelineStage::SingleCall;
    progress.progress(stage, 0, 1, stage.label());

    let request = CompletionRequest::new(
        system_prompt(&scope.context),
        user_prompt(items, scope.rag_context.as_deref()),
    )
    .temperature(OPTIMIZED_TEMPERATURE)
    .max_tokens(OPTIMIZED_MAX_TOKENS);
    let response = scope.session.complete_with(&request, parse_response).await?;

    let mut stage1 = Vec::with_capacity(items.len());
    let mut stage2 = Vec::with_capacity(items.len());
    let mut stage3 = Vec::with_capacity(items.len());
    let mut failed_items = 0;
    for (slot, item) in reorder(response.entries, items.len()).into_iter().zip(items) {
        let (s1, s2, s3) = match slot {
            Some(entry) => into_stage_outputs(entry, item),
            None => {
                tracing::warn!(item = %item.identifier(), "{MISSING}");
                (
                    Stage1Output::failed(MISSING),
                    Stage2Output::failed(MISSING),
                    Stage3Output::failed(item, MISSING),
                )
            }
        };
        if s1.is_failed() || s3.failed {
            failed_items += 1;
        }
        stage1.push(s1);
        stage2.push(s2);
        stage3.push(s3);
    }
    progress.progress(stage, 1, 1, "Single-call analysis ready");

    let insights = aggregate_insights(&stage2, items.len());
    let overall_summary = if response.overall_summary.is_empty() {
        fallback_summary(&insights)
    } else {
        response.overall_summary
    };
    Ok(SingleCallOutcome {
        report: ConsolidatedReport {
            overall_summary,
            rich_analysis_result: build_analysis(items, &stage1, &stage2),
            individual_reports: stage3,
            aggregated_insights: insights,
        },
        failed_items,
    })
}
