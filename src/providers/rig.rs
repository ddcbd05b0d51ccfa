//! rig-core integration for text completions.
//!
//! Uses rig-core's provider clients and Agent abstraction for multi-provider
//! support. Currently supports: Anthropic, OpenAI, Cohere, Gemini, Perplexity,
//! DeepSeek, xAI, Groq, and any OpenAI-compatible API.
//!
//! The API key arrives per call with the resolved [`ApiCredential`], so one
//! backend can serve runs for different users.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use crate::config::ProviderConfig;
use crate::credentials::ApiCredential;
use crate::models::ProviderName;

use super::{CompletionRequest, LlmBackend, ProviderError};

/// Token cap used when a request does not set one.
///
/// Without an explicit limit some providers (e.g. Gemini) default to a
/// low value that truncates responses.
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Maximum number of retry attempts for transient API errors.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay between retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum backoff delay between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Build a simple agent from a rig-core client and prompt it.
macro_rules! prompt_simple {
    ($client:expr, $model:expr, $request:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble(&$request.system_prompt)
            .temperature($request.temperature)
            .max_tokens($request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
            .build();
        agent
            .prompt($request.user_prompt.as_str())
            .await
            .map_err(|e| ProviderError::ApiError(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| {
            ProviderError::ApiError(format!("failed to create {} client: {e}", $label))
        })
    }};
}

/// rig-core based completion backend.
///
/// The provider name in config selects which rig-core client to build.
/// A base URL on the credential wins over the configured one.
pub struct RigBackend {
    name: ProviderName,
    model: String,
    base_url: Option<String>,
}

impl RigBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "no model configured for provider '{}'",
                config.name
            )));
        }
        Ok(Self {
            name: config.name,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    fn base_url<'a>(&'a self, credential: &'a ApiCredential) -> Option<&'a str> {
        credential.base_url.as_deref().or(self.base_url.as_deref())
    }

    /// Build an OpenAI-style client, optionally with a custom base URL.
    fn build_openai_client(
        api_key: &str,
        base_url: Option<&str>,
        label: &str,
    ) -> Result<providers::openai::CompletionsClient, ProviderError> {
        let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
        if let Some(base_url) = base_url {
            builder = builder.base_url(base_url);
        }
        let client: providers::openai::CompletionsClient = builder
            .build()
            .map_err(|e| ProviderError::ApiError(format!("failed to create {label} client: {e}")))?;
        Ok(client)
    }
}

#[async_trait]
impl LlmBackend for RigBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let api_key = credential.api_key.as_str();
        let model = self.model.as_str();

        match self.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        ProviderError::ApiError(format!("failed to create Anthropic client: {e}"))
                    })?;
                prompt_simple!(client, model, request, "Anthropic")
            }
            ProviderName::OpenAI => {
                let client = Self::build_openai_client(api_key, self.base_url(credential), "OpenAI")?;
                prompt_simple!(client, model, request, "OpenAI")
            }
            ProviderName::Cohere => {
                let client = new_client!(providers::cohere::Client, api_key, "Cohere")?;
                prompt_simple!(client, model, request, "Cohere")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                prompt_simple!(client, model, request, "Gemini")
            }
            ProviderName::Perplexity => {
                let client = new_client!(providers::perplexity::Client, api_key, "Perplexity")?;
                prompt_simple!(client, model, request, "Perplexity")
            }
            ProviderName::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                prompt_simple!(client, model, request, "DeepSeek")
            }
            ProviderName::XAI => {
                let client = new_client!(providers::xai::Client, api_key, "xAI")?;
                prompt_simple!(client, model, request, "xAI")
            }
            ProviderName::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                prompt_simple!(client, model, request, "Groq")
            }
            ProviderName::OpenAICompatible => {
                let base_url = self.base_url(credential).ok_or_else(|| {
                    ProviderError::NotConfigured(
                        "openai-compatible provider requires base_url to be set".to_string(),
                    )
                })?;
                let client =
                    Self::build_openai_client(api_key, Some(base_url), "OpenAI-compatible")?;
                prompt_simple!(client, model, request, "OpenAI-compatible")
            }
        }
    }
}

/// Check whether a provider error is transient and worth retrying.
///
/// Matches HTTP status codes commonly used for rate limiting and
/// temporary unavailability: 429 (Too Many Requests), 503 (Service
/// Unavailable), 529 (Overloaded), and connection/timeout errors.
pub fn is_retryable(err: &ProviderError) -> bool {
    classify_error(err).is_some()
}

/// Classifies a provider error into a short, user-friendly message.
///
/// Returns `Some(message)` for transient/retryable errors, `None` otherwise.
pub fn classify_error(err: &ProviderError) -> Option<&'static str> {
    match err {
        ProviderError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429")
                || msg_lower.contains("rate limit")
                || msg_lower.contains("too many requests")
            {
                Some("Rate limited by API")
            } else if msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("high demand")
            {
                Some("High model load")
            } else if msg_lower.contains("529") || msg_lower.contains("overloaded") {
                Some("API overloaded")
            } else if msg_lower.contains("502") {
                Some("API gateway error")
            } else if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
                Some("Request timed out")
            } else if msg_lower.contains("connection") {
                Some("Connection error")
            } else if msg_lower.contains("temporarily") || msg_lower.contains("try again") {
                Some("Temporary API error")
            } else {
                None
            }
        }
        ProviderError::NotConfigured(_) => None,
    }
}

/// Compute the backoff duration for a retry attempt using exponential backoff.
pub fn retry_backoff(attempt: u32) -> Duration {
    let backoff = INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
    backoff.min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: ProviderName, base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name,
            model: "test-model".to_string(),
            base_url: base_url.map(str::to_string),
            api_key: None,
        }
    }

    #[test]
    fn new_backend_requires_model() {
        let mut cfg = config(ProviderName::Anthropic, None);
        cfg.model = "  ".to_string();
        match RigBackend::new(&cfg) {
            Err(e) => assert!(e.to_string().contains("no model"), "got: {e}"),
            Ok(_) => panic!("expected error for empty model"),
        }
    }

    #[test]
    fn new_backend_does_not_need_key() {
        let backend = RigBackend::new(&config(ProviderName::Anthropic, None)).unwrap();
        assert_eq!(backend.model(), "test-model");
    }

    #[test]
    fn credential_base_url_wins() {
        let backend =
            RigBackend::new(&config(ProviderName::OpenAICompatible, Some("https://cfg"))).unwrap();
        let mut credential = ApiCredential::new("k");
        assert_eq!(backend.base_url(&credential), Some("https://cfg"));
        credential.base_url = Some("https://user".to_string());
        assert_eq!(backend.base_url(&credential), Some("https://user"));
    }

    #[tokio::test]
    async fn openai_compatible_without_base_url_fails_fast() {
        let backend = RigBackend::new(&config(ProviderName::OpenAICompatible, None)).unwrap();
        let err = backend
            .complete(&ApiCredential::new("k"), &CompletionRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn retryable_429_rate_limit() {
        let err = ProviderError::ApiError(
            "Gemini API error: HttpError: Invalid status code 429 Too Many Requests".into(),
        );
        assert!(is_retryable(&err));
    }

    #[test]
    fn retryable_503_unavailable() {
        let err = ProviderError::ApiError(
            "Gemini API error: HttpError: Invalid status code 503 Service Unavailable".into(),
        );
        assert!(is_retryable(&err));
    }

    #[test]
    fn retryable_overloaded_message() {
        let err = ProviderError::ApiError("Anthropic API error: overloaded, try again later".into());
        assert!(is_retryable(&err));
    }

    #[test]
    fn not_retryable_auth_error() {
        let err = ProviderError::ApiError("Invalid API key: 401 Unauthorized".into());
        assert!(!is_retryable(&err));
    }

    #[test]
    fn not_retryable_not_configured() {
        let err = ProviderError::NotConfigured("missing key".into());
        assert!(!is_retryable(&err));
    }

    #[test]
    fn classify_error_messages() {
        let cases = [
            ("HTTP 502 Bad Gateway", Some("API gateway error")),
            ("request timed out after 30s", Some("Request timed out")),
            ("connection refused", Some("Connection error")),
            ("please try again later", Some("Temporary API error")),
            ("some unknown error", None),
        ];
        for (msg, expected) in cases {
            let err = ProviderError::ApiError(msg.into());
            assert_eq!(classify_error(&err), expected, "message: {msg}");
        }
    }

    #[test]
    fn backoff_is_exponential() {
        assert_eq!(retry_backoff(0), INITIAL_BACKOFF);
        assert_eq!(retry_backoff(1), Duration::from_secs(20));
        assert_eq!(retry_backoff(2), Duration::from_secs(40));
    }

    #[test]
    fn backoff_capped_at_max() {
        assert_eq!(retry_backoff(10), MAX_BACKOFF);
    }
}
