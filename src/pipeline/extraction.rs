//! Stage 1: what changed.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::constants::{EXTRACTION_MAX_TOKENS, EXTRACTION_TEMPERATURE, STAGE1_DIFF_CHARS};
use crate::models::{AnalysisContext, ContributionItem, FileChange, Stage1Output};
use crate::parse::{extract_json_object, Fields, ParseError};
use crate::prompts;
use crate::progress::PipelineStage;
use crate::providers::CompletionRequest;

use super::pool::WorkerPool;
use super::{PipelineError, StageContext, StageError};

const PERSONA: &str = "You are a senior software engineer reviewing a developer's contribution. \
     Your job is to identify precisely what changed.";

const RULES: &str = "Describe the change factually. List every file that changed with the kind of \
     change (Create, Update, Delete or Refactor) and a one-sentence technical description. \
     List third-party dependencies the change introduces, if any. When project context is \
     provided, note briefly how it informed your reading in `rag_utilization`.";

pub fn system_prompt(context: &AnalysisContext) -> String {
    prompts::system_prompt(PERSONA, context, RULES)
}

pub fn user_prompt(item: &ContributionItem, rag_context: Option<&str>) -> String {
    let mut prompt = format!("## Contribution\n\n{}\n\n", prompts::item_header(item));
    let _ = write!(prompt, "### Messages\n\n{}\n\n", item.commit_messages);
    let _ = write!(
        prompt,
        "### Diff\n\n```diff\n{}\n```\n\n",
        prompts::truncate_chars(&item.raw_diff, STAGE1_DIFF_CHARS)
    );
    prompt.push_str(&prompts::rag_section(rag_context));
    prompt.push_str(
        "\n## Response format\n\n\
         {\n  \"summary_high_level\": \"one or two sentences\",\n  \
         \"changes\": [{\"file_path\": \"...\", \"change_type\": \"Create|Update|Delete|Refactor\", \
         \"technical_description\": \"...\"}],\n  \
         \"new_dependencies\": [\"...\"],\n  \
         \"rag_utilization\": \"...\"\n}\n\n",
    );
    prompt.push_str(prompts::JSON_ONLY);
    prompt
}

/// Parse a Stage 1 response. `summary_high_level` is required.
pub fn parse_response(text: &str) -> Result<Stage1Output, ParseError> {
    let map = extract_json_object(text)?;
    let fields = Fields::new(&map);

    let summary_high_level = fields.required_str(&["summary_high_level", "summaryHighLevel"])?;
    if summary_high_level.is_empty() {
        return Err(ParseError::Shape {
            field: "summary_high_level",
            expected: "a non-empty string",
        });
    }

    Ok(Stage1Output {
        summary_high_level,
        changes: file_changes(&fields),
        new_dependencies: fields.strings(&["new_dependencies", "newDependencies"]),
        rag_utilization: fields.str_or_empty(&["rag_utilization", "ragUtilization"]),
        failed: false,
    })
}

/// Changed files listed under `changes`; entries without a path are dropped.
pub(crate) fn file_changes(fields: &Fields<'_>) -> Vec<FileChange> {
    fields
        .objects(&["changes"])
        .into_iter()
        .filter_map(|change| {
            let file_path = change.str_or_empty(&["file_path", "filePath", "path"]);
            if file_path.is_empty() {
                return None;
            }
            Some(FileChange {
                file_path,
                change_type: change
                    .str_or_empty(&["change_type", "changeType"])
                    .parse()
                    .unwrap_or_default(),
                technical_description: change.str_or_empty(&[
                    "technical_description",
                    "technicalDescription",
                    "description",
                ]),
            })
        })
        .collect()
}

/// Run Stage 1 for one item.
pub async fn extract(
    scope: &StageContext,
    item: &ContributionItem,
) -> Result<Stage1Output, StageError> {
    let request = CompletionRequest::new(
        system_prompt(&scope.context),
        user_prompt(item, scope.rag_context.as_deref()),
    )
    .temperature(EXTRACTION_TEMPERATURE)
    .max_tokens(EXTRACTION_MAX_TOKENS);
    scope.session.complete_with(&request, parse_response).await
}

/// Run Stage 1 over every item.
///
/// Never fails per item: a failed item becomes [`Stage1Output::failed`].
/// Only cancellation ends the batch early.
pub async fn extract_batch(
    scope: &StageContext,
    pool: &WorkerPool,
    items: &Arc<[ContributionItem]>,
) -> Result<Vec<Stage1Output>, PipelineError> {
    let stage = PipelineStage::Extraction;
    let results = pool
        .run(stage, (0..items.len()).collect(), |index| {
            let scope = scope.clone();
            let items = Arc::clone(items);
            async move {
                let item = &items[index];
                extract(&scope, item).await.unwrap_or_else(|e| {
                    tracing::warn!(item = %item.identifier(), error = %e, "extraction failed");
                    Stage1Output::failed(e)
                })
            }
        })
        .await
        .map_err(|i| PipelineError::cancelled(stage, i))?;

    Ok(results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(Stage1Output::failed))
        .collect())
}
