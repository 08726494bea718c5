use std::collections::HashMap;

use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::github::{ChangedFile, Issue, PullRequest};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::prompts::{PromptEngine, PromptKind};

pub const ISSUE_SYSTEM_PROMPT: &str =
    "You are an expert GitHub issue analyst. Summarize the ticket in clear language for QA.";
pub const PR_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Briefly summarize what the following pull request's code changes accomplish, in plain language for QA.";

const DIFF_TRUNCATED_MARKER: &str = "\n[diff truncated]\n";

/// Knobs for the summarization calls, taken from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummarySettings {
    pub model: String,
    pub include_diffs: bool,
    pub max_diff_chars: usize,
    pub issue_max_tokens: u32,
    pub pr_max_tokens: u32,
    pub pr_diff_max_tokens: u32,
}

impl From<&Config> for SummarySettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            include_diffs: config.include_diffs,
            max_diff_chars: config.max_diff_chars,
            issue_max_tokens: config.issue_max_tokens,
            pr_max_tokens: config.pr_max_tokens,
            pr_diff_max_tokens: config.pr_diff_max_tokens,
        }
    }
}

/// Turns issues and pull requests into QA-oriented summaries.
pub struct Summarizer<C> {
    client: C,
    prompts: PromptEngine,
    settings: SummarySettings,
}

impl<C: CompletionClient> Summarizer<C> {
    pub fn new(client: C, prompts: PromptEngine, settings: SummarySettings) -> Self {
        Self {
            client,
            prompts,
            settings,
        }
    }

    pub fn summarize_issue(&self, issue: &Issue) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("issue_title".to_string(), issue.title.clone());
        vars.insert(
            "issue_body".to_string(),
            issue.body.clone().unwrap_or_default(),
        );
        vars.insert("issue_labels".to_string(), issue.labels.join(", "));
        let prompt = self.prompts.render(PromptKind::IssueSummary, &vars)?;

        debug!(issue = issue.number, "summarizing issue");
        self.client.complete(&CompletionRequest::new(
            &self.settings.model,
            ISSUE_SYSTEM_PROMPT,
            &prompt,
            self.settings.issue_max_tokens,
        ))
    }

    pub fn summarize_pull_request(
        &self,
        pr: &PullRequest,
        files: &[ChangedFile],
    ) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("pr_number".to_string(), pr.number.to_string());
        vars.insert("pr_title".to_string(), pr.title.clone());
        vars.insert("pr_body".to_string(), pr.body.clone().unwrap_or_default());
        vars.insert(
            "changed_files".to_string(),
            files
                .iter()
                .map(|f| f.filename.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );

        let (kind, max_tokens) = if self.settings.include_diffs {
            vars.insert(
                "diffs".to_string(),
                concat_patches(files, self.settings.max_diff_chars),
            );
            (PromptKind::PrDiffSummary, self.settings.pr_diff_max_tokens)
        } else {
            (PromptKind::PrSummary, self.settings.pr_max_tokens)
        };
        let prompt = self.prompts.render(kind, &vars)?;

        debug!(
            pr = pr.number,
            files = files.len(),
            prompt = kind.name(),
            "summarizing pull request"
        );
        self.client.complete(&CompletionRequest::new(
            &self.settings.model,
            PR_SYSTEM_PROMPT,
            &prompt,
            max_tokens,
        ))
    }
}

/// Join every file's patch under a `--- <filename>` header, skipping files
/// without one, and cap the result at `max_chars` characters.
pub fn concat_patches(files: &[ChangedFile], max_chars: usize) -> String {
    let mut out = String::new();
    for file in files {
        let Some(patch) = file.patch.as_deref() else {
            continue;
        };
        out.push_str("--- ");
        out.push_str(&file.filename);
        out.push('\n');
        out.push_str(patch);
        if !patch.ends_with('\n') {
            out.push('\n');
        }
    }

    match out.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            out.truncate(cut);
            out.push_str(DIFF_TRUNCATED_MARKER);
            out
        }
        None => out,
    }
}
