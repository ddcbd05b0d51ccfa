//! LLM backend trait and provider integrations.
//!
//! The pipeline only ever asks for free-text completions; JSON is located
//! in the text afterwards by [`crate::parse`]. This keeps the seam small
//! enough that tests can script it with a closure-sized mock.

pub mod rig;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::ApiCredential;

/// Errors from the LLM backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Trait for text-completion LLM backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, used for cache keys and logging.
    fn model(&self) -> &str;

    /// Run one completion and return the raw response text.
    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError>;
}
