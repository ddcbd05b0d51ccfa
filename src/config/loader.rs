//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.densa.toml` in the working directory
//! 4. `~/.config/densa/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{
    DEFAULT_MAX_COMMITS, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_PRS, ENV_API_KEY, ENV_BASE_URL,
    ENV_MAX_CONCURRENT, ENV_MODEL, ENV_PROVIDER,
};
use crate::env::Env;
use crate::models::{AnalysisContext, ContributionType, Objective, ProviderName, Role, Seniority};
use crate::normalize::NormalizeOptions;
use crate::pipeline::Mode;
use crate::providers::rig::MAX_RETRIES;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub context: ContextConfig,
    pub cache: CacheConfig,
}

/// LLM provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Run shape: strategy, concurrency and selection limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub max_commits: usize,
    pub max_prs: usize,
    pub contribution_types: Vec<ContributionType>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Full,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: MAX_RETRIES,
            max_commits: DEFAULT_MAX_COMMITS,
            max_prs: DEFAULT_MAX_PRS,
            contribution_types: vec![ContributionType::Commit, ContributionType::PullRequest],
        }
    }
}

impl PipelineConfig {
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_commits: self.max_commits,
            max_prs: self.max_prs,
            contribution_types: self.contribution_types.clone(),
            ..NormalizeOptions::default()
        }
    }
}

/// Default audience for reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub seniority: Seniority,
    pub role: Role,
    pub objective: Objective,
    pub target_job_title: Option<String>,
    pub target_company: Option<String>,
    pub years_of_experience: Option<u32>,
    pub custom_instructions: Option<String>,
}

impl ContextConfig {
    pub fn analysis_context(&self) -> AnalysisContext {
        AnalysisContext {
            seniority: self.seniority,
            role: self.role,
            objective: self.objective,
            target_job_title: self.target_job_title.clone(),
            target_company: self.target_company.clone(),
            years_of_experience: self.years_of_experience,
            custom_instructions: self.custom_instructions.clone(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, the working-directory config, then
    /// applies environment variable overrides.
    pub fn load(work_dir: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: working-directory config
        if let Some(dir) = work_dir {
            let local_path = dir.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for non-default values).
    fn merge(&mut self, other: Config) {
        // Provider settings
        let default_provider = ProviderConfig::default();
        if other.provider.name != default_provider.name {
            self.provider.name = other.provider.name;
        }
        if other.provider.model != default_provider.model {
            self.provider.model = other.provider.model;
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }

        // Pipeline settings
        let default_pipeline = PipelineConfig::default();
        if other.pipeline.mode != default_pipeline.mode {
            self.pipeline.mode = other.pipeline.mode;
        }
        if other.pipeline.max_concurrent != default_pipeline.max_concurrent {
            self.pipeline.max_concurrent = other.pipeline.max_concurrent;
        }
        if other.pipeline.max_retries != default_pipeline.max_retries {
            self.pipeline.max_retries = other.pipeline.max_retries;
        }
        if other.pipeline.max_commits != default_pipeline.max_commits {
            self.pipeline.max_commits = other.pipeline.max_commits;
        }
        if other.pipeline.max_prs != default_pipeline.max_prs {
            self.pipeline.max_prs = other.pipeline.max_prs;
        }
        if other.pipeline.contribution_types != default_pipeline.contribution_types {
            self.pipeline.contribution_types = other.pipeline.contribution_types;
        }

        // Audience settings
        let default_context = ContextConfig::default();
        if other.context.seniority != default_context.seniority {
            self.context.seniority = other.context.seniority;
        }
        if other.context.role != default_context.role {
            self.context.role = other.context.role;
        }
        if other.context.objective != default_context.objective {
            self.context.objective = other.context.objective;
        }
        if other.context.target_job_title.is_some() {
            self.context.target_job_title = other.context.target_job_title;
        }
        if other.context.target_company.is_some() {
            self.context.target_company = other.context.target_company;
        }
        if other.context.years_of_experience.is_some() {
            self.context.years_of_experience = other.context.years_of_experience;
        }
        if other.context.custom_instructions.is_some() {
            self.context.custom_instructions = other.context.custom_instructions;
        }

        // Cache settings (disabled overrides enabled)
        if !other.cache.enabled {
            self.cache.enabled = false;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.var(ENV_PROVIDER) {
            match val.parse::<ProviderName>() {
                Ok(name) => self.provider.name = name,
                Err(_) => tracing::warn!(var = ENV_PROVIDER, value = %val, "ignoring invalid value"),
            }
        }
        if let Some(val) = env.var(ENV_MODEL) {
            self.provider.model = val;
        }
        if let Some(val) = env.var(ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }

        // Provider-specific API key resolution
        let api_key = env.first_of(&[ENV_API_KEY, self.provider.name.api_key_env_var()]);
        if api_key.is_some() {
            self.provider.api_key = api_key;
        }

        match env.parsed::<usize>(ENV_MAX_CONCURRENT) {
            Ok(Some(n)) if n > 0 => self.pipeline.max_concurrent = n,
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => tracing::warn!(
                var = ENV_MAX_CONCURRENT,
                "ignoring invalid value; expected a positive integer"
            ),
        }
    }
}
