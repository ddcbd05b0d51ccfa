//! Clap argument types and config overrides.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use densa::config::Config;
use densa::models::{ContributionType, Objective, PipelineResult, Role, Seniority};
use densa::pipeline::Mode;

/// Chain-of-density contribution analysis.
#[derive(Parser, Debug)]
#[command(
    name = "densa",
    version = densa::constants::VERSION,
    about = super::ABOUT,
)]
pub struct Cli {
    /// Log progress details to stderr (same as DENSA_LOG=info).
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Analyze a contribution scan and write the report.
    Analyze(Box<AnalyzeArgs>),

    /// Manage the LLM response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print version and build information.
    Version,
}

/// Cache management subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum CacheAction {
    /// Remove all cached responses.
    Clear,
    /// Show cache statistics (entry count and size).
    Stats,
    /// Print the cache directory path.
    Path,
}

/// Arguments for the `analyze` subcommand.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    // --- Input ---
    /// Contribution scan (JSON with `commits` and `pullRequests`).
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// User whose credential pays for the run.
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Text file with project background to ground the analysis.
    #[arg(long)]
    pub rag_context: Option<PathBuf>,

    // --- Strategy ---
    /// Full three-stage pipeline or a single call.
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Comma-separated contribution types to include: commit, pr.
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<ContributionType>,

    /// Most recent commits to analyze.
    #[arg(long)]
    pub max_commits: Option<usize>,

    /// Most recent pull requests to analyze.
    #[arg(long)]
    pub max_prs: Option<usize>,

    /// Max concurrent LLM calls per stage (1 runs items strictly in order).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrent: Option<u16>,

    // --- Audience ---
    #[arg(long)]
    pub seniority: Option<Seniority>,

    #[arg(long)]
    pub role: Option<Role>,

    #[arg(long)]
    pub objective: Option<Objective>,

    #[arg(long)]
    pub target_job_title: Option<String>,

    #[arg(long)]
    pub target_company: Option<String>,

    /// Years of professional experience.
    #[arg(long)]
    pub years: Option<u32>,

    /// Extra instructions appended to every prompt.
    #[arg(long)]
    pub instructions: Option<String>,

    // --- Output ---
    /// Output format.
    #[arg(long, default_value = "terminal")]
    pub format: OutputFormat,

    /// Hide the live stage display.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Disable the response cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

impl AnalyzeArgs {
    /// Apply flags on top of the loaded config (flags win).
    pub fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.pipeline.mode = mode;
        }
        if !self.types.is_empty() {
            config.pipeline.contribution_types = self.types.clone();
        }
        if let Some(n) = self.max_commits {
            config.pipeline.max_commits = n;
        }
        if let Some(n) = self.max_prs {
            config.pipeline.max_prs = n;
        }
        if let Some(n) = self.max_concurrent {
            config.pipeline.max_concurrent = usize::from(n);
        }
        if let Some(seniority) = self.seniority {
            config.context.seniority = seniority;
        }
        if let Some(role) = self.role {
            config.context.role = role;
        }
        if let Some(objective) = self.objective {
            config.context.objective = objective;
        }
        if self.target_job_title.is_some() {
            config.context.target_job_title = self.target_job_title.clone();
        }
        if self.target_company.is_some() {
            config.context.target_company = self.target_company.clone();
        }
        if self.years.is_some() {
            config.context.years_of_experience = self.years;
        }
        if self.instructions.is_some() {
            config.context.custom_instructions = self.instructions.clone();
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Terminal,
    Markdown,
    Json,
    /// Stream progress and the final event as server-sent events.
    Sse,
}

impl OutputFormat {
    /// Render the result using the renderer for this format.
    ///
    /// `Sse` renders nothing: the terminal event already carried the result.
    pub fn render(&self, result: &PipelineResult) -> String {
        use densa::output::OutputRenderer;
        match self {
            OutputFormat::Terminal => densa::output::terminal::TerminalRenderer.render(result),
            OutputFormat::Markdown => densa::output::markdown::MarkdownRenderer.render(result),
            OutputFormat::Json => {
                let mut out = densa::output::json::JsonRenderer.render(result);
                out.push('\n');
                out
            }
            OutputFormat::Sse => String::new(),
        }
    }

    /// Whether stdout carries machine-readable data only.
    pub fn is_machine_readable(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Sse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use densa::models::PipelineMetadata;

    fn parse(args: &[&str]) -> AnalyzeArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Analyze(args) => *args,
            _ => panic!("expected Analyze command"),
        }
    }

    #[test]
    fn analyze_defaults() {
        let args = parse(&["densa", "analyze", "--input", "scan.json"]);
        assert_eq!(args.input, PathBuf::from("scan.json"));
        assert_eq!(args.user, "local");
        assert_eq!(args.format, OutputFormat::Terminal);
        assert!(args.types.is_empty());
        assert!(args.mode.is_none());
    }

    #[test]
    fn analyze_all_flags() {
        let args = parse(&[
            "densa",
            "analyze",
            "-i",
            "scan.json",
            "--mode",
            "optimized",
            "--types",
            "commit,pr",
            "--max-commits",
            "1",
            "--max-concurrent",
            "2",
            "--seniority",
            "senior",
            "--objective",
            "performance-review",
            "--years",
            "8",
            "--format",
            "sse",
            "--no-cache",
        ]);
        assert_eq!(args.mode, Some(Mode::Optimized));
        assert_eq!(
            args.types,
            vec![ContributionType::Commit, ContributionType::PullRequest]
        );
        assert_eq!(args.max_commits, Some(1));
        assert_eq!(args.max_concurrent, Some(2));
        assert_eq!(args.seniority, Some(Seniority::Senior));
        assert_eq!(args.objective, Some(Objective::PerformanceReview));
        assert_eq!(args.years, Some(8));
        assert_eq!(args.format, OutputFormat::Sse);
        assert!(args.no_cache);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = Cli::try_parse_from([
            "densa",
            "analyze",
            "--input",
            "scan.json",
            "--max-concurrent",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["densa", "analyze"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.pipeline.max_prs = 3;
        config.context.target_company = Some("Acme".into());

        let args = parse(&[
            "densa",
            "analyze",
            "--input",
            "scan.json",
            "--max-commits",
            "1",
            "--role",
            "backend",
            "--no-cache",
        ]);
        args.apply(&mut config);

        assert_eq!(config.pipeline.max_commits, 1);
        assert_eq!(config.pipeline.max_prs, 3);
        assert_eq!(config.context.role, Role::Backend);
        assert_eq!(config.context.target_company.as_deref(), Some("Acme"));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn cache_and_version_commands() {
        let cli = Cli::try_parse_from(["densa", "cache", "stats"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Stats
            }
        ));
        let cli = Cli::try_parse_from(["densa", "--verbose", "version"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn sse_format_renders_nothing() {
        let result = PipelineResult::failed("boom", PipelineMetadata::default());
        assert!(OutputFormat::Sse.render(&result).is_empty());
        assert!(OutputFormat::Json.render(&result).ends_with("}\n"));
        assert!(OutputFormat::Sse.is_machine_readable());
        assert!(!OutputFormat::Markdown.is_machine_readable());
    }
}
