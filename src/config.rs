use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::resolver::Strategy;

pub const DEFAULT_CONFIG_PATH: &str = ".qabot.toml";
pub const DEFAULT_LABEL: &str = "needs-test";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub label: Option<String>,
    pub model: Option<String>,
    pub strategies: Option<Vec<String>>,
    pub include_diffs: Option<bool>,
    pub max_diff_chars: Option<usize>,
    pub issue_max_tokens: Option<u32>,
    pub pr_max_tokens: Option<u32>,
    pub pr_diff_max_tokens: Option<u32>,
    pub github_api_url: Option<String>,
    pub llm_api_url: Option<String>,
    pub github_token_env: Option<String>,
    pub llm_api_key_env: Option<String>,
    pub prompts_dir: Option<String>,
    pub dry_run: Option<bool>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub owner: String,
    pub repo: String,
    pub label: String,
    pub model: String,
    pub strategies: Vec<Strategy>,
    pub include_diffs: bool,
    pub max_diff_chars: usize,
    pub issue_max_tokens: u32,
    pub pr_max_tokens: u32,
    pub pr_diff_max_tokens: u32,
    pub github_api_url: String,
    pub llm_api_url: String,
    pub github_token_env: String,
    pub llm_api_key_env: String,
    pub prompts_dir: Option<String>,
    pub dry_run: bool,
}

impl Config {
    /// Build the run config from the CLI and, when present, the TOML file.
    ///
    /// An explicit `--config` path must exist; the default path is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        merge(file_config, cli)
    }

    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref strategies) = config.strategies {
        parse_strategies(strategies)?;
    }
    for (name, value) in [
        ("issue_max_tokens", config.issue_max_tokens),
        ("pr_max_tokens", config.pr_max_tokens),
        ("pr_diff_max_tokens", config.pr_diff_max_tokens),
    ] {
        if value == Some(0) {
            return Err(Error::ConfigValidation(format!("{name} must be > 0")));
        }
    }
    if config.max_diff_chars == Some(0) {
        return Err(Error::ConfigValidation(
            "max_diff_chars must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// Parse a strategy list, rejecting unknown names, repeats and empty lists.
pub fn parse_strategies(names: &[String]) -> Result<Vec<Strategy>> {
    if names.is_empty() {
        return Err(Error::ConfigValidation(
            "strategies must name at least one strategy".to_string(),
        ));
    }
    let mut strategies: Vec<Strategy> = Vec::with_capacity(names.len());
    for name in names {
        let strategy: Strategy = name.trim().parse()?;
        if strategies.contains(&strategy) {
            return Err(Error::ConfigValidation(format!(
                "duplicate strategy: {strategy}"
            )));
        }
        strategies.push(strategy);
    }
    Ok(strategies)
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let owner = cli
        .owner
        .clone()
        .or(file.owner)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            Error::ConfigValidation("repository owner is required (--owner)".to_string())
        })?;
    let repo = cli
        .repo
        .clone()
        .or(file.repo)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            Error::ConfigValidation("repository name is required (--repo)".to_string())
        })?;

    let strategies = match cli.strategies.as_ref().or(file.strategies.as_ref()) {
        Some(names) => parse_strategies(names)?,
        None => Strategy::default_order(),
    };

    Ok(Config {
        owner,
        repo,
        label: cli
            .label
            .clone()
            .or(file.label)
            .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
        model: cli
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        strategies,
        include_diffs: cli.include_diffs || file.include_diffs.unwrap_or(false),
        max_diff_chars: file.max_diff_chars.unwrap_or(20_000),
        issue_max_tokens: file.issue_max_tokens.unwrap_or(300),
        pr_max_tokens: file.pr_max_tokens.unwrap_or(200),
        pr_diff_max_tokens: file.pr_diff_max_tokens.unwrap_or(400),
        github_api_url: file
            .github_api_url
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
        llm_api_url: file
            .llm_api_url
            .unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
        github_token_env: file
            .github_token_env
            .unwrap_or_else(|| "GITHUB_TOKEN".to_string()),
        llm_api_key_env: file
            .llm_api_key_env
            .unwrap_or_else(|| "OPENAI_API_KEY".to_string()),
        prompts_dir: cli.prompts_dir.clone().or(file.prompts_dir),
        dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
    })
}

/// Access tokens for the two external APIs.
#[derive(Clone)]
pub struct Credentials {
    pub github_token: String,
    pub llm_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &"<redacted>")
            .field("llm_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn resolve(config: &Config) -> Result<Self> {
        Ok(Self {
            github_token: resolve_github_token(&config.github_token_env)?,
            llm_api_key: resolve_llm_api_key(&config.llm_api_key_env)?,
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the GitHub token: configured env var, then `GH_TOKEN`, then `gh auth token`.
pub fn resolve_github_token(token_env: &str) -> Result<String> {
    if let Some(token) = non_empty_env(token_env) {
        return Ok(token);
    }
    if let Some(token) = non_empty_env("GH_TOKEN") {
        debug!("using GitHub token from $GH_TOKEN");
        return Ok(token);
    }

    if let Ok(output) = Command::new("gh").args(["auth", "token"]).output()
        && output.status.success()
        && let Ok(token) = String::from_utf8(output.stdout)
        && !token.trim().is_empty()
    {
        debug!("using GitHub token from gh CLI");
        return Ok(token.trim().to_string());
    }

    Err(Error::Credentials(format!(
        "GitHub token not found in ${token_env}, $GH_TOKEN or `gh auth token`"
    )))
}

pub fn resolve_llm_api_key(key_env: &str) -> Result<String> {
    non_empty_env(key_env)
        .ok_or_else(|| Error::Credentials(format!("completion API key not found in ${key_env}")))
}
