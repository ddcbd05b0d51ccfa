//! Shared types used across all modules.
//!
//! Contribution records, the audience context, per-stage outputs and the
//! aggregate report live here; the pipeline and renderers import from this
//! module rather than from each other.

pub mod context;
pub mod contribution;
pub mod report;
pub mod stages;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use context::{AnalysisContext, Objective, Role, Seniority};
pub use contribution::{
    ContributionItem, ContributionKind, ContributionSet, ContributionType, ItemMetadata,
    RawCommit, RawFileStat, RawPullRequest,
};
pub use report::{
    AggregatedInsights, AnalysisResult, CommitAnalysis, Complexity, ComplexityDistribution,
    ConsolidatedReport, NameCount, PipelineMetadata, PipelineResult, PrAnalysis,
};
pub use stages::{
    ChangeType, Confidence, ContributionMetadata, DesignPattern, FileChange, Stage1Output,
    Stage2Output, Stage3Output, TechUsage,
};

/// Supported LLM provider backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Cohere,
    Gemini,
    Perplexity,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "xai")]
    XAI,
    Groq,
    /// Any OpenAI-compatible API (e.g. Ollama, Together, local servers).
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderName::Anthropic => write!(f, "anthropic"),
            ProviderName::OpenAI => write!(f, "openai"),
            ProviderName::Cohere => write!(f, "cohere"),
            ProviderName::Gemini => write!(f, "gemini"),
            ProviderName::Perplexity => write!(f, "perplexity"),
            ProviderName::DeepSeek => write!(f, "deepseek"),
            ProviderName::XAI => write!(f, "xai"),
            ProviderName::Groq => write!(f, "groq"),
            ProviderName::OpenAICompatible => write!(f, "openai-compatible"),
        }
    }
}

impl std::str::FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderName::Anthropic),
            "openai" => Ok(ProviderName::OpenAI),
            "cohere" => Ok(ProviderName::Cohere),
            "gemini" => Ok(ProviderName::Gemini),
            "perplexity" => Ok(ProviderName::Perplexity),
            "deepseek" => Ok(ProviderName::DeepSeek),
            "xai" => Ok(ProviderName::XAI),
            "groq" => Ok(ProviderName::Groq),
            "openai-compatible" => Ok(ProviderName::OpenAICompatible),
            other => Err(format!(
                "unsupported provider: '{other}'. Supported: anthropic, openai, cohere, \
                 gemini, perplexity, deepseek, xai, groq, openai-compatible"
            )),
        }
    }
}

impl ProviderName {
    /// Returns the provider-specific environment variable name for the API key.
    ///
    /// These match the env var names used by rig-core's `from_env()` implementations.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            ProviderName::Anthropic => "ANTHROPIC_API_KEY",
            ProviderName::OpenAI | ProviderName::OpenAICompatible => "OPENAI_API_KEY",
            ProviderName::Cohere => "COHERE_API_KEY",
            ProviderName::Gemini => "GEMINI_API_KEY",
            ProviderName::Perplexity => "PERPLEXITY_API_KEY",
            ProviderName::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderName::XAI => "XAI_API_KEY",
            ProviderName::Groq => "GROQ_API_KEY",
        }
    }
}
