use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use qabot::cli::Cli;
use qabot::config::{Config, Credentials};
use qabot::error::{Error, Result};
use qabot::github::GitHubTracker;
use qabot::llm::OpenAiClient;
use qabot::orchestrator::{Orchestrator, RunOutcome};
use qabot::prompts::PromptEngine;
use qabot::summarize::{SummarySettings, Summarizer};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr)
        .init();
}

fn build(config: Config) -> Result<Orchestrator<GitHubTracker, OpenAiClient>> {
    let credentials = Credentials::resolve(&config)?;
    let tracker = GitHubTracker::new(&config, &credentials.github_token);
    let client = OpenAiClient::new(&config.llm_api_url, &credentials.llm_api_key);
    let summarizer = Summarizer::new(
        client,
        PromptEngine::new(config.prompts_dir.clone()),
        SummarySettings::from(&config),
    );
    Ok(Orchestrator::new(tracker, summarizer, config))
}

async fn run(config: Config) -> Result<RunOutcome> {
    let orchestrator = build(config)?;
    let task = tokio::task::spawn_blocking(move || orchestrator.run());

    tokio::select! {
        joined = task => joined.map_err(|e| Error::Io(std::io::Error::other(e)))?,
        _ = tokio::signal::ctrl_c() => Err(Error::Interrupted),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Before logging, so RUST_LOG from .env applies.
    let dotenv = dotenvy::dotenv();
    init_logging();
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env"),
    }

    info!("qabot starting");

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(?config, "config loaded");

    match run(config).await {
        Ok(RunOutcome::NoIssues) => info!("nothing to do"),
        Ok(RunOutcome::Processed(report)) => info!(?report, "finished"),
        Err(Error::Interrupted) => {
            error!("interrupted");
            std::process::exit(130);
        }
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
