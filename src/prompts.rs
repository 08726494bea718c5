use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

const DEFAULT_ISSUE_SUMMARY: &str = include_str!("default_prompts/issue-summary.md");
const DEFAULT_PR_SUMMARY: &str = include_str!("default_prompts/pr-summary.md");
const DEFAULT_PR_DIFF_SUMMARY: &str = include_str!("default_prompts/pr-diff-summary.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &[
    "issue_title",
    "issue_body",
    "issue_labels",
    "pr_number",
    "pr_title",
    "pr_body",
    "changed_files",
    "diffs",
];

/// The prompts the summarizers render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    IssueSummary,
    PrSummary,
    PrDiffSummary,
}

impl PromptKind {
    pub fn name(&self) -> &'static str {
        match self {
            PromptKind::IssueSummary => "issue-summary",
            PromptKind::PrSummary => "pr-summary",
            PromptKind::PrDiffSummary => "pr-diff-summary",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            PromptKind::IssueSummary => DEFAULT_ISSUE_SUMMARY,
            PromptKind::PrSummary => DEFAULT_PR_SUMMARY,
            PromptKind::PrDiffSummary => DEFAULT_PR_DIFF_SUMMARY,
        }
    }

    fn filename(&self) -> String {
        format!("{}.md", self.name())
    }
}

/// Prompt template engine with default templates and user overrides.
#[derive(Debug, Clone, Default)]
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// Load the template for `kind`.
    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, kind: PromptKind) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(kind.filename());
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        Ok(kind.default_template().to_string())
    }

    pub fn render(&self, kind: PromptKind, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(kind)?;
        render_template(&template, vars)
    }
}

/// Render a template string by substituting `{{variable}}` placeholders.
/// Errors on unknown variables (strict mode).
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut found_close = false;

            while let Some(c2) = chars.next() {
                if c2 == '}' && chars.peek() == Some(&'}') {
                    chars.next();
                    found_close = true;
                    break;
                }
                var_name.push(c2);
            }

            if !found_close {
                return Err(Error::Prompt(format!(
                    "unclosed template variable: {{{{{var_name}"
                )));
            }

            let var_name = var_name.trim();
            if !KNOWN_VARIABLES.contains(&var_name) {
                return Err(Error::Prompt(format!(
                    "unknown template variable: {var_name}"
                )));
            }

            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(Error::Prompt(format!(
                        "missing value for template variable: {var_name}"
                    )));
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
