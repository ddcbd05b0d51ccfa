//! Run-scoped LLM access.
//!
//! An [`LlmSession`] bundles the backend with the credential resolved at run
//! start, so no stage looks the credential up again. It also owns the cache
//! lookups, the retry loop and the call counter reported in metadata.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CacheEngine};
use crate::credentials::ApiCredential;
use crate::parse::ParseError;
use crate::providers::rig::{classify_error, is_retryable, retry_backoff, MAX_RETRIES};
use crate::providers::{CompletionRequest, LlmBackend, ProviderError};

use super::StageError;

/// Backend, credential and per-run bookkeeping for one pipeline run.
pub struct LlmSession {
    backend: Arc<dyn LlmBackend>,
    credential: ApiCredential,
    cache: Arc<CacheEngine>,
    max_retries: u32,
    backoff: fn(u32) -> Duration,
    calls: Arc<AtomicUsize>,
}

impl LlmSession {
    pub fn new(backend: Arc<dyn LlmBackend>, credential: ApiCredential) -> Self {
        Self {
            backend,
            credential,
            cache: Arc::new(CacheEngine::disabled()),
            max_retries: MAX_RETRIES,
            backoff: retry_backoff,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheEngine>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: fn(u32) -> Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Share a call counter owned by the caller.
    pub fn with_call_counter(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Requests sent to the backend so far, retries included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Complete a request and turn the text into `T`.
    ///
    /// A cached response is reused only if it still parses, and a fresh
    /// response is cached only once it has parsed, so a garbled answer
    /// is never replayed.
    pub async fn complete_with<T>(
        &self,
        request: &CompletionRequest,
        parse: impl Fn(&str) -> Result<T, ParseError>,
    ) -> Result<T, StageError> {
        let key = cache::cache_key(
            self.model(),
            request.temperature,
            &request.system_prompt,
            &request.user_prompt,
        );
        if let Some(hit) = self.cache.get(&key) {
            match parse(&hit) {
                Ok(value) => {
                    tracing::debug!(key = %&key[..12], "cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::debug!(error = %e, "ignoring unparseable cache entry"),
            }
        }

        let text = self.send(request).await?;
        let value = parse(&text)?;
        self.cache.put(&key, self.model(), &text);
        Ok(value)
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            self.calls.fetch_add(1, Ordering::AcqRel);
            match self.backend.complete(&self.credential, request).await {
                Ok(text) => return Ok(text),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    let backoff = (self.backoff)(attempt);
                    tracing::warn!(
                        reason = classify_error(&e).unwrap_or("Transient error"),
                        attempt = attempt + 1,
                        max = self.max_retries + 1,
                        backoff_secs = backoff.as_secs(),
                        "retrying LLM call"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::FileStore;

    /// Returns scripted results in order, then repeats the last one.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _credential: &ApiCredential,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            }
        }
    }

    fn no_wait(_: u32) -> Duration {
        Duration::ZERO
    }

    fn as_text(text: &str) -> Result<String, ParseError> {
        Ok(text.to_string())
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("system", "user").temperature(0.3)
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let backend = Scripted::new(vec![
            Err(ProviderError::ApiError("429 Too Many Requests".into())),
            Err(ProviderError::ApiError("503 Service Unavailable".into())),
            Ok("done".into()),
        ]);
        let session = LlmSession::new(backend, ApiCredential::new("k")).with_retries(3, no_wait);
        let text = session.complete_with(&request(), as_text).await.unwrap();
        assert_eq!(text, "done");
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let backend = Scripted::new(vec![Err(ProviderError::ApiError("overloaded".into()))]);
        let session = LlmSession::new(backend, ApiCredential::new("k")).with_retries(2, no_wait);
        let err = session.complete_with(&request(), as_text).await.unwrap_err();
        assert!(matches!(err, StageError::Provider(_)));
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let backend = Scripted::new(vec![Err(ProviderError::ApiError("401 Unauthorized".into()))]);
        let session = LlmSession::new(backend, ApiCredential::new("k")).with_retries(5, no_wait);
        assert!(session.complete_with(&request(), as_text).await.is_err());
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn parse_failures_surface_as_parse_errors() {
        let backend = Scripted::new(vec![Ok("no json here".into())]);
        let session = LlmSession::new(backend, ApiCredential::new("k"));
        let err = session
            .complete_with(&request(), crate::parse::extract_json_object)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Parse(ParseError::NoJsonObject { .. })));
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheEngine::with_store(
            true,
            FileStore::new_with_dir(dir.path().to_path_buf()),
        ));
        let backend = Scripted::new(vec![Ok("{\"a\": 1}".into())]);
        let session =
            LlmSession::new(backend, ApiCredential::new("k")).with_cache(Arc::clone(&cache));

        session.complete_with(&request(), as_text).await.unwrap();
        session.complete_with(&request(), as_text).await.unwrap();
        assert_eq!(session.calls(), 1);
    }

    #[tokio::test]
    async fn unparseable_responses_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheEngine::with_store(
            true,
            FileStore::new_with_dir(dir.path().to_path_buf()),
        ));
        let backend = Scripted::new(vec![Ok("garbled".into())]);
        let session = LlmSession::new(backend, ApiCredential::new("k")).with_cache(cache);

        let parse = crate::parse::extract_json_object;
        assert!(session.complete_with(&request(), parse).await.is_err());
        assert!(session.complete_with(&request(), parse).await.is_err());
        assert_eq!(session.calls(), 2);
    }
}
