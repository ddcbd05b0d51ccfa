//! densa: chain-of-density contribution analysis CLI.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use densa::cache;
use densa::config;
use densa::constants;
use densa::credentials;
use densa::env;
use densa::models;
use densa::pipeline;
use densa::progress;
use densa::providers;

use std::io::IsTerminal;
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::args::{AnalyzeArgs, CacheAction, Cli, Command, OutputFormat};
use config::Config;
use env::Env;
use models::ContributionSet;
use pipeline::{ChainOfDensity, PipelineOptions};
use progress::{ProgressReporter, SseSink, TerminalProgress};
use providers::rig::{retry_backoff, RigBackend};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze(args) => run_analyze(*args).await,
        Command::Cache { action } => run_cache(action),
        Command::Version => run_version(),
    }
}

/// Install the stderr log subscriber.
///
/// `DENSA_LOG` (then `RUST_LOG`) wins; otherwise `--verbose` means
/// `info` and the default is `warn`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "densa=info" } else { "warn" };
    let filter = EnvFilter::try_from_env(constants::ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Print detailed version and build information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!("{} {}", constants::APP_NAME.bold(), constants::VERSION.green().bold());
    println!("{}     {}", "target:".dimmed(), constants::TARGET);
    Ok(())
}

/// Manage the response cache.
fn run_cache(action: CacheAction) -> Result<()> {
    let engine = cache::CacheEngine::new(true);

    match action {
        CacheAction::Clear => {
            let stats = engine.clear().context("failed to clear cache")?;
            println!(
                "Cleared {} cached entry/entries ({}).",
                stats.entries,
                stats.human_size(),
            );
        }
        CacheAction::Stats => {
            let stats = engine.stats().context("failed to read cache stats")?;
            println!("Cache entries: {}", stats.entries);
            println!("Cache size:    {}", stats.human_size());
        }
        CacheAction::Path => match engine.path() {
            Some(p) => println!("{}", p.display()),
            None => bail!("cache directory could not be determined"),
        },
    }

    Ok(())
}

fn read_contributions(path: &Path) -> Result<ContributionSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid contribution scan", path.display()))
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let work_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let mut config = Config::load(Some(&work_dir), &Env::real())
        .context("failed to load configuration")?;
    args.apply(&mut config);

    let contributions = read_contributions(&args.input)?;
    let rag_context = match &args.rag_context {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let backend = RigBackend::new(&config.provider).context("invalid provider configuration")?;
    let credentials = credentials::ConfigCredentials::new(config.provider.clone());

    // Progress goes to stdout for SSE, to stderr for interactive terminals.
    let mut reporter = ProgressReporter::new();
    if args.format == OutputFormat::Sse {
        reporter = reporter.with_sink(Arc::new(SseSink::new(std::io::stdout())));
    } else if !args.no_progress && !args.format.is_machine_readable() && std::io::stderr().is_terminal() {
        reporter = reporter.with_sink(Arc::new(TerminalProgress::new(true)));
    }

    let pipeline = ChainOfDensity::new(Arc::new(backend), Arc::new(credentials))
        .with_cache(Arc::new(cache::CacheEngine::new(config.cache.enabled)))
        .with_progress(Arc::new(reporter))
        .with_retries(config.pipeline.max_retries, retry_backoff);

    // Ctrl-C stops new items from starting; in-flight calls finish.
    let cancel = pipeline.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight calls");
            cancel.cancel();
        }
    });

    let options = PipelineOptions {
        normalize: config.pipeline.normalize_options(),
        context: config.context.analysis_context(),
        rag_context,
        max_concurrent: config.pipeline.max_concurrent,
    };
    let result = pipeline
        .run_mode(config.pipeline.mode, &contributions, &args.user, &options)
        .await;

    print!("{}", args.format.render(&result));

    if !result.success {
        bail!(
            "analysis did not complete: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
