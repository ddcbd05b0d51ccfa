//! Stage 2: how and why.
//!
//! The only stage that sanitizes the model's output field by field, since
//! its results feed the aggregate technology and pattern counts.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::constants::{DIFF_SNIPPET_CHARS, PATTERNS_MAX_TOKENS, PATTERNS_TEMPERATURE};
use crate::models::{
    AnalysisContext, Confidence, ContributionItem, DesignPattern, Stage1Output, Stage2Output,
    TechUsage,
};
use crate::parse::{extract_json_object, Fields, ParseError};
use crate::prompts;
use crate::progress::PipelineStage;
use crate::providers::CompletionRequest;

use super::pool::WorkerPool;
use super::{ensure_len, PipelineError, StageContext, StageError};

const PERSONA: &str = "You are a staff engineer assessing the technical depth of a contribution. \
     You explain how it was built and why it matters.";

const RULES: &str = "Using the extraction and the key diff snippets, identify the technologies \
     actually exercised (with their purpose), the design patterns applied (with a confidence of \
     High, Medium or Low and a short justification), the key engineering decisions, and the \
     architectural impact. Only claim a pattern with High confidence when the code clearly shows it.";

pub fn system_prompt(context: &AnalysisContext) -> String {
    prompts::system_prompt(PERSONA, context, RULES)
}

pub fn user_prompt(stage1: &Stage1Output, item: &ContributionItem) -> String {
    let extraction = serde_json::to_string_pretty(stage1)
        .unwrap_or_else(|_| stage1.summary_high_level.clone());
    let mut prompt = format!("## Contribution\n\n{}\n\n", prompts::item_header(item));
    let _ = write!(prompt, "## Extraction\n\n```json\n{extraction}\n```\n\n");
    let _ = write!(
        prompt,
        "## Key snippets\n\n```diff\n{}\n```\n\n",
        prompts::truncate_chars(&item.raw_diff, DIFF_SNIPPET_CHARS)
    );
    prompt.push_str(
        "## Response format\n\n\
         {\n  \"tech_stack_utilized\": [{\"name\": \"...\", \"purpose\": \"...\"}],\n  \
         \"design_patterns\": [{\"name\": \"...\", \"confidence\": \"High|Medium|Low\", \
         \"justification\": \"...\"}],\n  \
         \"key_decisions\": [\"...\"],\n  \
         \"architectural_impact\": \"...\"\n}\n\n",
    );
    prompt.push_str(prompts::JSON_ONLY);
    prompt
}

/// Parse a Stage 2 response, dropping malformed entries.
///
/// Entries whose `name` is missing or not a string are skipped, unknown
/// confidence values become `Low`, and non-array fields read as empty.
pub fn parse_response(text: &str) -> Result<Stage2Output, ParseError> {
    let map = extract_json_object(text)?;
    Ok(sanitize(&Fields::new(&map)))
}

pub(crate) fn sanitize(fields: &Fields<'_>) -> Stage2Output {
    let tech_stack_utilized = fields
        .objects(&["tech_stack_utilized", "techStackUtilized", "technologies"])
        .into_iter()
        .filter_map(|tech| {
            let name = tech.str_or_empty(&["name"]);
            (!name.is_empty()).then(|| TechUsage {
                name,
                purpose: tech.str_or_empty(&["purpose"]),
            })
        })
        .collect();

    let design_patterns = fields
        .objects(&["design_patterns", "designPatterns"])
        .into_iter()
        .filter_map(|pattern| {
            let name = pattern.str_or_empty(&["name"]);
            (!name.is_empty()).then(|| DesignPattern {
                name,
                confidence: Confidence::coerce(&pattern.str_or_empty(&["confidence"])),
                justification: pattern.str_or_empty(&["justification"]),
            })
        })
        .collect();

    Stage2Output {
        tech_stack_utilized,
        design_patterns,
        key_decisions: fields.strings(&["key_decisions", "keyDecisions"]),
        architectural_impact: fields.str_or_empty(&["architectural_impact", "architecturalImpact"]),
        failed: false,
    }
}

/// Run Stage 2 for one item.
pub async fn recognize(
    scope: &StageContext,
    stage1: &Stage1Output,
    item: &ContributionItem,
) -> Result<Stage2Output, StageError> {
    let request = CompletionRequest::new(system_prompt(&scope.context), user_prompt(stage1, item))
        .temperature(PATTERNS_TEMPERATURE)
        .max_tokens(PATTERNS_MAX_TOKENS);
    scope.session.complete_with(&request, parse_response).await
}

/// Run Stage 2 over every item.
///
/// `stage1` must line up with `items` index for index; a length mismatch
/// is a caller bug and fails the run.
pub async fn recognize_batch(
    scope: &StageContext,
    pool: &WorkerPool,
    items: &Arc<[ContributionItem]>,
    stage1: &Arc<[Stage1Output]>,
) -> Result<Vec<Stage2Output>, PipelineError> {
    let stage = PipelineStage::PatternRecognition;
    ensure_len(stage, items.len(), stage1.len())?;

    let results = pool
        .run(stage, (0..items.len()).collect(), |index| {
            let scope = scope.clone();
            let items = Arc::clone(items);
            let stage1 = Arc::clone(stage1);
            async move {
                let item = &items[index];
                recognize(&scope, &stage1[index], item)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(item = %item.identifier(), error = %e, "pattern recognition failed");
                        Stage2Output::failed(e)
                    })
            }
        })
        .await
        .map_err(|i| PipelineError::cancelled(stage, i))?;

    Ok(results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(Stage2Output::failed))
        .collect())
}
