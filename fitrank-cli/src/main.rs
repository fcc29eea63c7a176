//! fitrank CLI
//!
//! Explainable buying-intent ranking from web signals.

mod config;
mod server;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fitrank_core::{JobStatus, RawResult};
use fitrank_runtime::{RunRequest, WebSearchOptions};
use fitrank_search::Recency;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{build_registry, FitrankConfig, Secrets};
use server::AppState;

#[derive(Parser)]
#[command(name = "fitrank")]
#[command(author, version, about = "fitrank: explainable B2B buying-intent ranking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3); RUST_LOG overrides when set
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// Path to fitrank.toml
    #[arg(short, long, env = "FITRANK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    keys: ApiKeys,
}

#[derive(Args)]
struct ApiKeys {
    /// Serper API key (or set SERPER_API_KEY env var)
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true, global = true)]
    serper_key: Option<String>,

    /// Brave Search API key (or set BRAVE_API_KEY env var)
    #[arg(long, env = "BRAVE_API_KEY", hide_env_values = true, global = true)]
    brave_key: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_key: Option<String>,

    /// OpenRouter API key (or set OPENROUTER_API_KEY env var)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    openrouter_key: Option<String>,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    anthropic_key: Option<String>,
}

impl From<ApiKeys> for Secrets {
    fn from(keys: ApiKeys) -> Self {
        Secrets {
            serper: keys.serper_key,
            brave: keys.brave_key,
            openai: keys.openai_key,
            openrouter: keys.openrouter_key,
            anthropic: keys.anthropic_key,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Rank companies for one query and print the result
    Run {
        /// Free-text description of the target buyers
        #[arg(short, long)]
        query: String,

        /// Number of companies to return
        #[arg(short = 'k', long)]
        top_k: Option<i64>,

        /// Search recency: week or month
        #[arg(long, value_parser = parse_recency)]
        recency: Option<Recency>,

        /// Results requested per planned search query (1-50)
        #[arg(long)]
        max_results: Option<i64>,

        /// JSON array of raw results to rank instead of searching
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the full job as JSON here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

fn parse_recency(raw: &str) -> Result<Recency, String> {
    match raw.to_ascii_lowercase().as_str() {
        "week" => Ok(Recency::Week),
        "month" => Ok(Recency::Month),
        other => Err(format!("expected week or month, got {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = FitrankConfig::load(cli.config.as_deref())?;
    config.validate().context("invalid configuration")?;
    let secrets = Secrets::from(cli.keys);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let addr = config.bind_addr()?;
            let registry = Arc::new(build_registry(&config, &secrets)?);
            server::serve(AppState { registry }, addr).await?;
        }
        Commands::Run {
            query,
            top_k,
            recency,
            max_results,
            input,
            output,
        } => {
            run_once(&config, &secrets, &query, top_k, recency, max_results, input, output).await?;
        }
        Commands::CheckConfig => {
            println!("Configuration OK");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .init();
        return;
    }

    let log_level = match verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

#[allow(clippy::too_many_arguments)]
async fn run_once(
    config: &FitrankConfig,
    secrets: &Secrets,
    query: &str,
    top_k: Option<i64>,
    recency: Option<Recency>,
    max_results: Option<i64>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut request = RunRequest::new(query);
    request.top_k = top_k;
    request.web_search_options = Some(WebSearchOptions {
        recency,
        max_results_per_task: max_results,
    });

    if let Some(path) = input {
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let results: Vec<RawResult> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        println!("Ranking {} supplied results\n", results.len());
        request = request.offline(results);
    }

    let registry = build_registry(config, secrets)?;
    let summary = registry.run(&request).await?;
    let job = &summary.job;

    println!("Job {} {}", job.id, job.status);
    println!(
        "  {} raw results, {} signals, {} classified, {} unclassifiable",
        job.progress.raw_results, job.progress.signals, job.progress.classified, job.progress.classification_failures
    );
    if let Some(error) = &job.error {
        println!("  {}: {}", error.code, error.message);
    }
    println!();

    for (i, company) in job.results.iter().enumerate() {
        println!("{:>3}. {:<32} {:.3}  {}", i + 1, company.company_id, company.fit_score, company.reasons.join(", "));
    }

    if let Some(path) = output {
        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        println!("\nSaved to {}", path.display());
    }

    if job.status == JobStatus::Failed {
        bail!("run failed");
    }
    Ok(())
}
