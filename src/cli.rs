use clap::Parser;

/// qabot — post LLM-written QA summaries on labeled GitHub issues
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "qabot", version, about)]
pub struct Cli {
    /// Path to config file (default: .qabot.toml if present)
    #[arg(long)]
    pub config: Option<String>,

    /// Repository owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long)]
    pub repo: Option<String>,

    /// Label selecting the issues to summarize
    #[arg(long)]
    pub label: Option<String>,

    /// Completion model (default: gpt-4o)
    #[arg(long)]
    pub model: Option<String>,

    /// Comma-separated PR lookup order
    /// (timeline, body-reference, open-pr-scan, comment-scan)
    #[arg(long, value_delimiter = ',')]
    pub strategies: Option<Vec<String>>,

    /// Feed each changed file's patch into the PR summary
    #[arg(long)]
    pub include_diffs: bool,

    /// Directory with prompt template overrides
    #[arg(long)]
    pub prompts_dir: Option<String>,

    /// Log the comments instead of posting them
    #[arg(long)]
    pub dry_run: bool,
}
