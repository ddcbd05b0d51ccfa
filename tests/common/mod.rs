//! Shared helpers for pipeline integration tests.
//!
//! [`MockBackend`] answers every request without touching the network. It
//! tells the calls apart by the section headings each prompt carries, and
//! it records every request so tests can count and order them.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use densa::credentials::{ApiCredential, StaticCredentials};
use densa::models::ContributionSet;
use densa::pipeline::{ChainOfDensity, PipelineOptions};
use densa::providers::{CompletionRequest, LlmBackend, ProviderError};

pub const USER: &str = "alice";

/// Which pipeline call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Extraction,
    Patterns,
    Report,
    Summary,
    SingleCall,
}

pub fn classify(request: &CompletionRequest) -> CallKind {
    let prompt = &request.user_prompt;
    if prompt.contains("individualReports") {
        CallKind::SingleCall
    } else if prompt.contains("## Extraction") {
        CallKind::Patterns
    } else if prompt.contains("## How and why") {
        CallKind::Report
    } else if prompt.contains("## Scope") {
        CallKind::Summary
    } else {
        CallKind::Extraction
    }
}

/// The item header line of a per-item prompt.
pub fn header(request: &CompletionRequest) -> String {
    request
        .user_prompt
        .lines()
        .nth(2)
        .unwrap_or_default()
        .to_string()
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync;

pub struct MockBackend {
    responder: Box<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new(
        responder: impl Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every call with a valid, item-specific response.
    pub fn well_behaved() -> Arc<Self> {
        Self::new(|request| Ok(default_reply(request)))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.requests().iter().map(classify).collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        _credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

/// A valid response for any call.
pub fn default_reply(request: &CompletionRequest) -> String {
    let header = header(request);
    match classify(request) {
        CallKind::Extraction => json!({
            "summary_high_level": format!("Summary: {header}"),
            "changes": [
                {"file_path": "src/lib.rs", "change_type": "Update", "technical_description": "wired up"}
            ],
            "new_dependencies": ["tokio"],
            "rag_utilization": ""
        })
        .to_string(),
        CallKind::Patterns => format!(
            "Sure, here is the analysis:\n{}",
            json!({
                "tech_stack_utilized": [
                    {"name": "Rust", "purpose": "core"},
                    {"name": "tokio", "purpose": "async runtime"}
                ],
                "design_patterns": [
                    {"name": "Builder", "confidence": "High", "justification": "fluent setup"},
                    {"name": "Observer", "confidence": "Low", "justification": "maybe"}
                ],
                "key_decisions": ["Keep the seam small"],
                "architectural_impact": format!("Impact: {header}")
            })
        ),
        CallKind::Report => format!("# Report\n\n{header}\n"),
        CallKind::Summary => "An executive summary.".to_string(),
        CallKind::SingleCall => single_call_reply(request, true),
    }
}

/// Per-item headers listed in a single-call prompt, in prompt order.
pub fn single_call_headers(request: &CompletionRequest) -> Vec<(usize, String)> {
    request
        .user_prompt
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("### [")?;
            let (index, header) = rest.split_once("] ")?;
            Some((index.parse().ok()?, header.to_string()))
        })
        .collect()
}

/// A single-call response with entries in reverse order.
pub fn single_call_reply(request: &CompletionRequest, with_summary: bool) -> String {
    let entries: Vec<serde_json::Value> = single_call_headers(request)
        .into_iter()
        .rev()
        .map(|(index, header)| {
            json!({
                "contributionIndex": index,
                "summary": format!("Summary: {header}"),
                "changes": [{"filePath": "src/lib.rs", "changeType": "Update", "description": "wired"}],
                "newDependencies": [],
                "technologies": ["Rust"],
                "designPatterns": ["Builder"],
                "keyDecisions": ["Ship it"],
                "architecturalImpact": format!("Impact: {header}"),
                "markdownReport": format!("# {header}")
            })
        })
        .collect();
    json!({
        "overallSummary": if with_summary { "One-pass summary." } else { "" },
        "individualReports": entries
    })
    .to_string()
}

pub fn scan() -> ContributionSet {
    serde_json::from_str(include_str!("../fixtures/scan.json")).unwrap()
}

pub fn no_wait(_attempt: u32) -> Duration {
    Duration::ZERO
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new().with(USER, ApiCredential::new("sk-test")))
}

/// A pipeline over `backend` with no retries and no cache.
pub fn pipeline(backend: Arc<MockBackend>) -> ChainOfDensity {
    ChainOfDensity::new(backend, credentials()).with_retries(0, no_wait)
}

/// One commit and one pull request: the 7-call scenario.
pub fn options() -> PipelineOptions {
    let mut options = PipelineOptions::default();
    options.normalize.max_commits = 1;
    options
}
