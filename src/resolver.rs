//! Pull-request association discovery.
//!
//! Given an issue number, the [`Resolver`] walks an ordered list of
//! [`Strategy`] values and returns the first pull request any of them finds.
//! Lookup failures inside a strategy count as "nothing found"; the resolver
//! itself never fails.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::github::IssueTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// `connected` / `cross-referenced` timeline events sourced from a PR.
    Timeline,
    /// First `#N` in the issue body, confirmed to be a PR.
    BodyReference,
    /// First open PR whose body mentions `#<issue>`.
    OpenPrScan,
    /// PR URL or confirmed `#N` in the issue's comments.
    CommentScan,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Timeline,
        Strategy::BodyReference,
        Strategy::OpenPrScan,
        Strategy::CommentScan,
    ];

    pub fn default_order() -> Vec<Strategy> {
        vec![
            Strategy::Timeline,
            Strategy::BodyReference,
            Strategy::CommentScan,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Timeline => "timeline",
            Strategy::BodyReference => "body-reference",
            Strategy::OpenPrScan => "open-pr-scan",
            Strategy::CommentScan => "comment-scan",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let expected: Vec<&str> = Strategy::ALL.iter().map(|s| s.name()).collect();
                Error::ConfigValidation(format!(
                    "unknown strategy: {s} (expected: {})",
                    expected.join(", ")
                ))
            })
    }
}

fn hash_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\d+)").expect("valid regex"))
}

/// First `#N` token in `text`.
pub fn first_hash_reference(text: &str) -> Option<u64> {
    hash_reference_re()
        .captures(text)
        .and_then(|cap| cap[1].parse().ok())
}

/// Whether `text` contains `#<number>` not followed by another digit.
pub fn mentions_number(text: &str, number: u64) -> bool {
    hash_reference_re()
        .captures_iter(text)
        .any(|cap| cap[1].parse::<u64>().ok() == Some(number))
}

/// Case-insensitive matcher for `github.com/<owner>/<repo>/pull/N` URLs.
pub fn pull_request_url_regex(owner: &str, repo: &str) -> Regex {
    let pattern = format!(
        r"(?i)github\.com/{}/{}/pull/(\d+)",
        regex::escape(owner),
        regex::escape(repo)
    );
    Regex::new(&pattern).expect("escaped owner and repo form a valid regex")
}

/// Pull request number from the first URL in `text` matched by `re`.
pub fn pull_request_url_number(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text).and_then(|cap| cap[1].parse().ok())
}

pub struct Resolver<'a, T> {
    tracker: &'a T,
    repo_slug: String,
    pull_url_re: Regex,
    strategies: Vec<Strategy>,
}

impl<'a, T: IssueTracker> Resolver<'a, T> {
    pub fn new(tracker: &'a T, owner: &str, repo: &str, strategies: Vec<Strategy>) -> Self {
        Self {
            tracker,
            repo_slug: format!("{owner}/{repo}"),
            pull_url_re: pull_request_url_regex(owner, repo),
            strategies,
        }
    }

    /// The pull request associated with `issue_number`, or `None` when every
    /// strategy comes up empty.
    pub fn resolve(&self, issue_number: u64) -> Option<u64> {
        self.strategies.iter().find_map(|strategy| {
            let found = self.run(*strategy, issue_number);
            match found {
                Some(pr) => debug!(issue = issue_number, pr, %strategy, "association found"),
                None => debug!(issue = issue_number, %strategy, "strategy found nothing"),
            }
            found
        })
    }

    pub fn run(&self, strategy: Strategy, issue_number: u64) -> Option<u64> {
        let result = match strategy {
            Strategy::Timeline => self.from_timeline(issue_number),
            Strategy::BodyReference => self.from_body_reference(issue_number),
            Strategy::OpenPrScan => self.from_open_pull_requests(issue_number),
            Strategy::CommentScan => self.from_comments(issue_number),
        };
        result.unwrap_or_else(|e| {
            debug!(issue = issue_number, %strategy, error = %e, "lookup failed");
            None
        })
    }

    fn from_timeline(&self, issue_number: u64) -> Result<Option<u64>> {
        let events = self.tracker.list_timeline(issue_number)?;
        Ok(events.iter().find_map(|e| e.linked_pull_request(&self.repo_slug)))
    }

    fn from_body_reference(&self, issue_number: u64) -> Result<Option<u64>> {
        let issue = self.tracker.get_issue(issue_number)?;
        let candidate = issue.body.as_deref().and_then(first_hash_reference);
        Ok(candidate.filter(|&n| self.is_pull_request(n)))
    }

    fn from_open_pull_requests(&self, issue_number: u64) -> Result<Option<u64>> {
        let prs = self.tracker.list_open_pull_requests()?;
        Ok(prs
            .iter()
            .find(|pr| {
                pr.body
                    .as_deref()
                    .is_some_and(|body| mentions_number(body, issue_number))
            })
            .map(|pr| pr.number))
    }

    fn from_comments(&self, issue_number: u64) -> Result<Option<u64>> {
        let comments = self.tracker.list_comments(issue_number)?;
        Ok(comments.iter().find_map(|comment| {
            if let Some(n) = pull_request_url_number(&self.pull_url_re, &comment.body) {
                return Some(n);
            }
            first_hash_reference(&comment.body).filter(|&n| self.is_pull_request(n))
        }))
    }

    /// Issues and PRs share one numbering space, so a bare number only counts
    /// once the PR endpoint accepts it.
    fn is_pull_request(&self, number: u64) -> bool {
        match self.tracker.get_pull_request(number) {
            Ok(_) => true,
            Err(e) => {
                debug!(number, error = %e, "reference is not a pull request");
                false
            }
        }
    }
}
