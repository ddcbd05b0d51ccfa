//! Single-call runs: one request, entries mapped back to their items.

mod common;

use pretty_assertions::assert_eq;
use serde_json::Value;

use common::{CallKind, MockBackend, USER};
use densa::pipeline::Mode;

/// A single-call reply keeping only the entries `keep` accepts.
fn reply_keeping(request: &densa::providers::CompletionRequest, keep: fn(usize) -> bool) -> String {
    let mut reply: Value = serde_json::from_str(&common::single_call_reply(request, true)).unwrap();
    let entries = reply["individualReports"].as_array_mut().unwrap();
    entries.retain(|e| keep(e["contributionIndex"].as_u64().unwrap() as usize));
    reply.to_string()
}

#[tokio::test]
async fn whole_run_is_one_call() {
    let backend = MockBackend::well_behaved();
    let result = common::pipeline(backend.clone())
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    assert!(result.success, "run failed: {:?}", result.error);
    assert_eq!(result.metadata.llm_calls, 1);
    assert_eq!(backend.kinds(), vec![CallKind::SingleCall]);
    assert_eq!(result.metadata.total_contributions, 2);
    assert_eq!(result.metadata.processed_contributions, 2);
    assert_eq!(result.metadata.failed_contributions, 0);
    assert!(result.metadata.step1_completed_at.is_none());

    let report = result.consolidated_report.unwrap();
    assert_eq!(report.overall_summary, "One-pass summary.");
    assert_eq!(report.aggregated_insights.total_contributions, 2);
}

#[tokio::test]
async fn reversed_entries_map_back_to_their_items() {
    let backend = MockBackend::well_behaved();
    let result = common::pipeline(backend)
        .run_mode(Mode::Optimized, &common::scan(), USER, &common::options())
        .await;

    let report = result.consolidated_report.unwrap();
    let reports = &report.individual_reports;
    assert_eq!(reports[0].contribution_metadata.identifier, "a1b2c3d");
    assert!(reports[0].markdown_report.starts_with("# Commit a1b2c3d"));
    assert_eq!(reports[1].contribution_metadata.identifier, "#42");
    assert!(reports[1].markdown_report.starts_with("# Pull request #42"));

    let rich = &report.rich_analysis_result;
    assert!(rich.commit_analyses[0].summary.contains("a1b2c3d"));
    assert!(rich.pr_analyses[0].summary.contains("#42"));
}

#[tokio::test]
async fn plain_pattern_names_count_as_high_confidence() {
    let backend = MockBackend::well_behaved();
    let result = common::pipeline(backend)
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    let report = result.consolidated_report.unwrap();
    let top = &report.aggregated_insights.top_patterns;
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].name, "Builder");
    assert_eq!(top[0].count, 2);
}

#[tokio::test]
async fn missing_entry_gets_a_placeholder() {
    let backend = MockBackend::new(|request| Ok(reply_keeping(request, |index| index == 0)));
    let result = common::pipeline(backend)
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.metadata.failed_contributions, 1);

    let report = result.consolidated_report.unwrap();
    assert!(!report.individual_reports[0].failed);
    assert!(report.individual_reports[1].failed);
    assert!(report.individual_reports[1]
        .markdown_report
        .contains("Report unavailable for #42"));
    assert_eq!(report.rich_analysis_result.failed_items, 1);
}

#[tokio::test]
async fn empty_overall_summary_uses_fallback() {
    let backend = MockBackend::new(|request| Ok(common::single_call_reply(request, false)));
    let result = common::pipeline(backend)
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    let summary = result.consolidated_report.unwrap().overall_summary;
    assert!(summary.starts_with("## Summary\n\nAnalyzed 2 contribution(s)."));
}

#[tokio::test]
async fn garbled_response_fails_the_run() {
    let backend = MockBackend::new(|_| Ok("Here is my analysis, in prose.".to_string()));
    let result = common::pipeline(backend)
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("single-call analysis failed"), "{error}");
    assert_eq!(result.metadata.llm_calls, 1);
}

#[tokio::test]
async fn wrong_shape_fails_the_run() {
    let backend = MockBackend::new(|_| {
        Ok(r#"{"overallSummary": "ok", "individualReports": "none"}"#.to_string())
    });
    let result = common::pipeline(backend)
        .run_optimized(&common::scan(), USER, &common::options())
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("individualReports"));
}

#[tokio::test]
async fn unknown_user_fails_without_calling() {
    let backend = MockBackend::well_behaved();
    let result = common::pipeline(backend.clone())
        .run_optimized(&common::scan(), "nobody", &common::options())
        .await;

    assert!(!result.success);
    assert!(backend.requests().is_empty());
}
