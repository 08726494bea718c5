use tracing::{error, info, warn};

use crate::comment::{PrSection, build_comment};
use crate::config::Config;
use crate::error::Result;
use crate::github::{Issue, IssueTracker};
use crate::llm::CompletionClient;
use crate::resolver::Resolver;
use crate::summarize::Summarizer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub issues: usize,
    pub associations: usize,
    pub comments_posted: usize,
    pub comments_failed: usize,
    pub comments_skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostStatus {
    Posted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    NoIssues,
    Processed(RunReport),
}

pub struct Orchestrator<T, C> {
    tracker: T,
    summarizer: Summarizer<C>,
    config: Config,
}

impl<T: IssueTracker, C: CompletionClient> Orchestrator<T, C> {
    pub fn new(tracker: T, summarizer: Summarizer<C>, config: Config) -> Self {
        Self {
            tracker,
            summarizer,
            config,
        }
    }

    /// Summarize every open issue carrying the configured label.
    ///
    /// Only the initial issue listing can fail the run; everything after that
    /// is absorbed into the comment or logged per issue.
    pub fn run(&self) -> Result<RunOutcome> {
        info!(
            repo = %self.config.repo_slug(),
            label = %self.config.label,
            "fetching labeled issues"
        );
        let issues = self.tracker.list_labeled_issues(&self.config.label)?;
        if issues.is_empty() {
            info!(label = %self.config.label, "no issues found with label");
            return Ok(RunOutcome::NoIssues);
        }
        info!(count = issues.len(), "found labeled issues");

        let resolver = Resolver::new(
            &self.tracker,
            &self.config.owner,
            &self.config.repo,
            self.config.strategies.clone(),
        );

        let mut report = RunReport::default();
        for issue in &issues {
            report.issues += 1;
            let pr_number = resolver.resolve(issue.number);
            if pr_number.is_some() {
                report.associations += 1;
            }

            let body = self.comment_for(issue, pr_number);
            match self.post(issue.number, &body) {
                PostStatus::Posted => report.comments_posted += 1,
                PostStatus::Skipped => report.comments_skipped += 1,
                PostStatus::Failed => report.comments_failed += 1,
            }
        }

        info!(
            issues = report.issues,
            associations = report.associations,
            posted = report.comments_posted,
            failed = report.comments_failed,
            skipped = report.comments_skipped,
            "run complete"
        );
        Ok(RunOutcome::Processed(report))
    }

    fn comment_for(&self, issue: &Issue, pr_number: Option<u64>) -> String {
        let issue_summary = self.summarizer.summarize_issue(issue);
        if let Err(ref e) = issue_summary {
            warn!(issue = issue.number, error = %e, "issue summary failed");
        }

        let pr_section = match pr_number {
            None => {
                info!(issue = issue.number, "no associated pull request");
                PrSection::NotFound
            }
            Some(number) => {
                info!(issue = issue.number, pr = number, "associated pull request");
                match self.summarize_pull_request(number) {
                    Ok(text) => PrSection::Summary { number, text },
                    Err(error) => {
                        warn!(
                            issue = issue.number,
                            pr = number,
                            error = %error,
                            "pull request summary failed"
                        );
                        PrSection::Failed { number, error }
                    }
                }
            }
        };

        build_comment(&issue_summary, &pr_section)
    }

    fn summarize_pull_request(&self, number: u64) -> Result<String> {
        let pr = self.tracker.get_pull_request(number)?;
        let files = self.tracker.list_pull_request_files(number)?;
        self.summarizer.summarize_pull_request(&pr, &files)
    }

    /// Post the comment, or log it in dry-run mode. Failures are logged, never raised.
    fn post(&self, issue_number: u64, body: &str) -> PostStatus {
        if self.config.dry_run {
            info!(issue = issue_number, "dry run, comment not posted:\n{body}");
            return PostStatus::Skipped;
        }
        match self.tracker.create_comment(issue_number, body) {
            Ok(()) => {
                info!(issue = issue_number, "commented on issue");
                PostStatus::Posted
            }
            Err(e) => {
                error!(issue = issue_number, error = %e, "failed to comment on issue");
                PostStatus::Failed
            }
        }
    }
}
