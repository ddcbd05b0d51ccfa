//! Stage 3: the audience-facing markdown report.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::constants::{REPORTING_MAX_TOKENS, REPORTING_TEMPERATURE};
use crate::models::{
    AnalysisContext, ContributionItem, ContributionMetadata, Stage1Output, Stage2Output,
    Stage3Output,
};
use crate::parse::ParseError;
use crate::prompts;
use crate::progress::PipelineStage;
use crate::providers::CompletionRequest;

use super::pool::WorkerPool;
use super::{ensure_len, PipelineError, StageContext, StageError};

const PERSONA: &str = "You are a technical writer who turns engineering analysis into \
     compelling, accurate prose about a developer's work.";

const RULES: &str = "Write a markdown report for this single contribution. Open with a short \
     headline, then explain what was built, how it was built and why it matters, pitched at the \
     audience above. Be specific and never invent details that are not in the analysis. \
     Return only the markdown.";

pub fn system_prompt(context: &AnalysisContext) -> String {
    prompts::system_prompt(PERSONA, context, RULES)
}

pub fn user_prompt(stage1: &Stage1Output, stage2: &Stage2Output, item: &ContributionItem) -> String {
    let mut prompt = format!("## Contribution\n\n{}\n\n", prompts::item_header(item));

    let _ = write!(prompt, "## What changed\n\n{}\n\n", stage1.summary_high_level);
    for change in &stage1.changes {
        let _ = writeln!(
            prompt,
            "- `{}` ({}): {}",
            change.file_path, change.change_type, change.technical_description
        );
    }
    if !stage1.new_dependencies.is_empty() {
        let _ = write!(
            prompt,
            "\nNew dependencies: {}\n",
            stage1.new_dependencies.join(", ")
        );
    }

    prompt.push_str("\n## How and why\n\n");
    for tech in &stage2.tech_stack_utilized {
        let _ = writeln!(prompt, "- Technology: {} ({})", tech.name, tech.purpose);
    }
    for pattern in &stage2.design_patterns {
        let _ = writeln!(
            prompt,
            "- Pattern: {} [{}] {}",
            pattern.name, pattern.confidence, pattern.justification
        );
    }
    for decision in &stage2.key_decisions {
        let _ = writeln!(prompt, "- Decision: {decision}");
    }
    let _ = write!(
        prompt,
        "\nArchitectural impact: {}\n",
        stage2.architectural_impact
    );
    prompt
}

fn parse_markdown(text: &str) -> Result<String, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Run Stage 3 for one item. The response text is the report.
pub async fn report(
    scope: &StageContext,
    stage1: &Stage1Output,
    stage2: &Stage2Output,
    item: &ContributionItem,
) -> Result<Stage3Output, StageError> {
    let request = CompletionRequest::new(
        system_prompt(&scope.context),
        user_prompt(stage1, stage2, item),
    )
    .temperature(REPORTING_TEMPERATURE)
    .max_tokens(REPORTING_MAX_TOKENS);
    let markdown_report = scope.session.complete_with(&request, parse_markdown).await?;
    Ok(Stage3Output {
        markdown_report,
        contribution_metadata: ContributionMetadata::from(item),
        failed: false,
    })
}

/// Run Stage 3 over every item. A failed report becomes an error block.
pub async fn report_batch(
    scope: &StageContext,
    pool: &WorkerPool,
    items: &Arc<[ContributionItem]>,
    stage1: &Arc<[Stage1Output]>,
    stage2: &Arc<[Stage2Output]>,
) -> Result<Vec<Stage3Output>, PipelineError> {
    let stage = PipelineStage::Reporting;
    ensure_len(stage, items.len(), stage1.len())?;
    ensure_len(stage, items.len(), stage2.len())?;

    let results = pool
        .run(stage, (0..items.len()).collect(), |index| {
            let scope = scope.clone();
            let items = Arc::clone(items);
            let stage1 = Arc::clone(stage1);
            let stage2 = Arc::clone(stage2);
            async move {
                let item = &items[index];
                report(&scope, &stage1[index], &stage2[index], item)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(item = %item.identifier(), error = %e, "report generation failed");
                        Stage3Output::failed(item, e)
                    })
            }
        })
        .await
        .map_err(|i| PipelineError::cancelled(stage, i))?;

    Ok(results
        .into_iter()
        .zip(items.iter())
        .map(|(slot, item)| slot.unwrap_or_else(|e| Stage3Output::failed(item, e)))
        .collect())
}
