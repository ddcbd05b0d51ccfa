//! Prompt plumbing shared by every stage.
//!
//! Stages own their task-specific instructions; this module turns an
//! [`AnalysisContext`] into audience wording and provides the truncation
//! helpers that bound prompt size.

use std::fmt::Write as _;

use crate::models::{AnalysisContext, ContributionItem, Objective, Role, Seniority};

/// Appended to every prompt that expects a JSON answer.
pub const JSON_ONLY: &str = "Respond with a single JSON object and nothing else. \
     Do not wrap it in prose. Use double-quoted keys exactly as specified.";

fn seniority_phrase(seniority: Seniority) -> &'static str {
    match seniority {
        Seniority::Junior => "a junior engineer building their first body of work",
        Seniority::Mid => "a mid-level engineer who ships features independently",
        Seniority::Senior => "a senior engineer who owns systems end to end",
        Seniority::Staff => "a staff engineer whose work shapes several teams",
        Seniority::Principal => "a principal engineer setting technical direction",
    }
}

fn role_phrase(role: Role) -> &'static str {
    match role {
        Role::Frontend => "frontend development (UI, client state, accessibility, performance)",
        Role::Backend => "backend development (APIs, data models, reliability, scalability)",
        Role::Fullstack => "full-stack development across client and server",
        Role::Devops => "infrastructure, CI/CD and operational tooling",
        Role::Mobile => "mobile application development",
        Role::Data => "data engineering and analytics pipelines",
        Role::Security => "application and infrastructure security",
    }
}

fn objective_phrase(objective: Objective) -> &'static str {
    match objective {
        Objective::Resume => {
            "resume material: concrete, outcome-focused statements a recruiter can skim"
        }
        Objective::PerformanceReview => {
            "a performance review: impact, scope and growth over the review period"
        }
        Objective::Interview => {
            "interview preparation: stories with context, decisions and trade-offs"
        }
        Objective::Portfolio => {
            "a public portfolio: approachable explanations of what was built and why"
        }
    }
}

/// Describe the reader the analysis is for.
pub fn audience(context: &AnalysisContext) -> String {
    let mut out = format!(
        "The developer is {}, focused on {}. The output will be used for {}.",
        seniority_phrase(context.seniority),
        role_phrase(context.role),
        objective_phrase(context.objective),
    );
    if let Some(years) = context.years_of_experience {
        let _ = write!(out, " They have {years} years of professional experience.");
    }
    match (
        context.target_job_title.as_deref(),
        context.target_company.as_deref(),
    ) {
        (Some(title), Some(company)) => {
            let _ = write!(out, " They are targeting a {title} position at {company}.");
        }
        (Some(title), None) => {
            let _ = write!(out, " They are targeting a {title} position.");
        }
        (None, Some(company)) => {
            let _ = write!(out, " They are targeting a position at {company}.");
        }
        (None, None) => {}
    }
    if let Some(instructions) = context
        .custom_instructions
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let _ = write!(out, "\n\nAdditional instructions from the developer:\n{instructions}");
    }
    out
}

/// Compose a system prompt from a role line, the audience and task rules.
pub fn system_prompt(persona: &str, context: &AnalysisContext, rules: &str) -> String {
    format!("{persona}\n\n## Audience\n\n{}\n\n## Instructions\n\n{rules}", audience(context))
}

/// Keep at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n… [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// One-line header identifying an item inside a prompt.
pub fn item_header(item: &ContributionItem) -> String {
    let mut header = format!("{} {}", kind_label(item), item.identifier());
    let headline = item.headline();
    if !headline.is_empty() {
        let _ = write!(header, ": {headline}");
    }
    if let Some(author) = &item.metadata.author {
        let _ = write!(header, " (by {author}");
        if let Some(date) = &item.metadata.date {
            let _ = write!(header, ", {date}");
        }
        header.push(')');
    }
    header
}

fn kind_label(item: &ContributionItem) -> &'static str {
    match item.kind {
        crate::models::ContributionKind::Commit => "Commit",
        crate::models::ContributionKind::PullRequest => "Pull request",
    }
}

/// RAG context block, or a note that none was supplied.
pub fn rag_section(rag_context: Option<&str>) -> String {
    match rag_context.map(str::trim).filter(|s| !s.is_empty()) {
        Some(rag) => format!("## Project context\n\n{rag}\n"),
        None => "## Project context\n\nNo project context was provided.\n".to_string(),
    }
}
