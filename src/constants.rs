//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and the per-stage sampling parameters so tuning only touches this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "densa";

/// Crate version, as reported by `densa version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target triple the binary was compiled for.
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `.densa.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".densa.toml";

/// Directory name under `~/.config/` for global config and cache.
pub const CONFIG_DIR: &str = "densa";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "DENSA_PROVIDER";
pub const ENV_MODEL: &str = "DENSA_MODEL";
pub const ENV_API_KEY: &str = "DENSA_API_KEY";
pub const ENV_BASE_URL: &str = "DENSA_BASE_URL";
pub const ENV_MAX_CONCURRENT: &str = "DENSA_MAX_CONCURRENT";
pub const ENV_LOG: &str = "DENSA_LOG";

// ── Normalization defaults ──────────────────────────────────────────

pub const DEFAULT_MAX_COMMITS: usize = 20;
pub const DEFAULT_MAX_PRS: usize = 10;

/// Characters of raw diff embedded in Stage 2 and optimized prompts.
pub const DIFF_SNIPPET_CHARS: usize = 2000;

/// Characters of raw diff embedded in Stage 1 prompts.
pub const STAGE1_DIFF_CHARS: usize = 12_000;

// ── Sampling parameters ─────────────────────────────────────────────

pub const EXTRACTION_TEMPERATURE: f64 = 0.3;
pub const EXTRACTION_MAX_TOKENS: u64 = 2000;

pub const PATTERNS_TEMPERATURE: f64 = 0.3;
pub const PATTERNS_MAX_TOKENS: u64 = 2000;

pub const REPORTING_TEMPERATURE: f64 = 0.7;
pub const REPORTING_MAX_TOKENS: u64 = 3000;

pub const SUMMARY_TEMPERATURE: f64 = 0.5;
pub const SUMMARY_MAX_TOKENS: u64 = 1500;

pub const OPTIMIZED_TEMPERATURE: f64 = 0.4;
pub const OPTIMIZED_MAX_TOKENS: u64 = 16_000;

// ── Aggregation limits ──────────────────────────────────────────────

/// Entries kept in `topTechnologies` / `topPatterns`.
pub const TOP_N: usize = 10;

/// Entries kept in `keyAchievements`.
pub const MAX_KEY_ACHIEVEMENTS: usize = 5;

/// Default worker pool size for batch stages.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Footer appended to rendered reports.
pub const AI_DISCLOSURE: &str =
    "Written by densa with an LLM. Review before sharing; models can misread diffs.";
