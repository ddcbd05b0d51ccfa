//! Per-user LLM credential lookup.
//!
//! A run resolves its credential exactly once, before any LLM call, and
//! carries the result through the call graph explicitly.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;

/// Errors from credential lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no LLM API credential found for user '{0}'")]
    NotFound(String),

    #[error("LLM API credential for user '{user}' is invalid: {reason}")]
    Invalid { user: String, reason: String },
}

/// A decrypted API key plus the endpoint it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl ApiCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Resolves a user's LLM credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<ApiCredential, CredentialError>;
}

/// Uses the configured provider key for every user.
///
/// This is the single-tenant CLI case: whoever runs the binary owns the key.
pub struct ConfigCredentials {
    provider: ProviderConfig,
}

impl ConfigCredentials {
    pub fn new(provider: ProviderConfig) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentials {
    async fn resolve(&self, user_id: &str) -> Result<ApiCredential, CredentialError> {
        let key = self
            .provider
            .api_key
            .as_deref()
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))?;
        validate_key(user_id, key)?;
        Ok(ApiCredential {
            api_key: key.trim().to_string(),
            base_url: self.provider.base_url.clone(),
        })
    }
}

/// Fixed per-user credentials, keyed by user id.
#[derive(Default)]
pub struct StaticCredentials {
    keys: HashMap<String, ApiCredential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: impl Into<String>, credential: ApiCredential) -> Self {
        self.keys.insert(user_id.into(), credential);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn resolve(&self, user_id: &str) -> Result<ApiCredential, CredentialError> {
        let credential = self
            .keys
            .get(user_id)
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))?;
        validate_key(user_id, &credential.api_key)?;
        Ok(credential.clone())
    }
}

fn validate_key(user_id: &str, key: &str) -> Result<(), CredentialError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CredentialError::Invalid {
            user: user_id.to_string(),
            reason: "key is empty".to_string(),
        });
    }
    if key.chars().any(char::is_whitespace) {
        return Err(CredentialError::Invalid {
            user: user_id.to_string(),
            reason: "key contains whitespace".to_string(),
        });
    }
    Ok(())
}
