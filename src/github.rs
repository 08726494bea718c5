use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

const USER_AGENT: &str = "qabot";
const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// Domain snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
}

/// A file touched by a pull request. `patch` is absent for binary or oversized diffs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub source: Option<TimelineSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineSource {
    #[serde(default)]
    pub issue: Option<TimelineIssue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineIssue {
    pub number: u64,
    /// Present only when the referencing issue is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
    #[serde(default)]
    pub repository: Option<TimelineRepository>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineRepository {
    pub full_name: String,
}

impl TimelineEvent {
    /// Number of the pull request in `repo_slug` (`owner/repo`) that links to
    /// the issue through this event, if any. A source without repository
    /// information is taken to be local.
    pub fn linked_pull_request(&self, repo_slug: &str) -> Option<u64> {
        let kind = self.event.as_deref()?;
        if kind != "connected" && kind != "cross-referenced" {
            return None;
        }
        let issue = self.source.as_ref()?.issue.as_ref()?;
        issue.pull_request.as_ref()?;
        match &issue.repository {
            Some(repo) if !repo.full_name.eq_ignore_ascii_case(repo_slug) => None,
            _ => Some(issue.number),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// --- REST response types ---

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    html_url: String,
}

impl From<GhIssue> for Issue {
    fn from(gh: GhIssue) -> Self {
        Issue {
            number: gh.number,
            title: gh.title,
            body: gh.body,
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            html_url: gh.html_url,
        }
    }
}

impl From<GhPullRequest> for PullRequest {
    fn from(gh: GhPullRequest) -> Self {
        PullRequest {
            number: gh.number,
            title: gh.title,
            body: gh.body,
            html_url: gh.html_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport abstraction (for testability)
// ---------------------------------------------------------------------------

/// Raw JSON access to the GitHub REST API. Paths are relative to the API root;
/// query pairs are passed unencoded.
pub trait GitHubApi {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value>;
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// `ureq`-backed client. One attempt per call.
pub struct DefaultGitHubApi {
    base_url: String,
    token: String,
    agent: ureq::Agent,
}

impl DefaultGitHubApi {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set("Accept", "application/vnd.github+json")
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("User-Agent", USER_AGENT)
            .set("X-GitHub-Api-Version", API_VERSION)
    }
}

fn into_json(
    method: &str,
    path: &str,
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<serde_json::Value> {
    match result {
        Ok(response) => response.into_json().map_err(|e| {
            Error::GitHub(format!("failed to parse response for {method} {path}: {e}"))
        }),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(status_error(method, path, code, &body))
        }
        Err(e) => Err(Error::GitHub(format!("{method} {path} failed: {e}"))),
    }
}

/// Error for a non-2xx response. GitHub puts the reason in `message`.
fn status_error(method: &str, path: &str, code: u16, body: &str) -> Error {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_default();
    Error::GitHub(format!("{method} {path} returned {code}: {detail}"))
}

impl GitHubApi for DefaultGitHubApi {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let request = query
            .iter()
            .fold(self.request("GET", path), |req, (name, value)| {
                req.query(name, value)
            });
        into_json("GET", path, request.call())
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        into_json("POST", path, self.request("POST", path).send_json(body))
    }
}

// ---------------------------------------------------------------------------
// IssueTracker
// ---------------------------------------------------------------------------

/// Issue-tracker operations the resolver and orchestrator depend on.
pub trait IssueTracker {
    /// Open issues carrying `label`. Pull requests are excluded.
    fn list_labeled_issues(&self, label: &str) -> Result<Vec<Issue>>;

    fn list_timeline(&self, issue_number: u64) -> Result<Vec<TimelineEvent>>;

    fn get_issue(&self, issue_number: u64) -> Result<Issue>;

    /// Fails when `number` is not a pull request.
    fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>>;

    fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>>;

    fn list_pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>>;

    fn create_comment(&self, issue_number: u64, body: &str) -> Result<()>;
}

pub struct GitHubTracker {
    owner: String,
    repo: String,
    client: Box<dyn GitHubApi + Send>,
}

impl GitHubTracker {
    pub fn new(config: &Config, token: &str) -> Self {
        Self::with_client(
            &config.owner,
            &config.repo,
            Box::new(DefaultGitHubApi::new(&config.github_api_url, token)),
        )
    }

    pub fn with_client(owner: &str, repo: &str, client: Box<dyn GitHubApi + Send>) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            client,
        }
    }

    fn repo_path(&self, rest: &str) -> String {
        format!("/repos/{}/{}{rest}", self.owner, self.repo)
    }

    fn get_as<T: serde::de::DeserializeOwned>(
        &self,
        rest: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let value = self.client.get(&self.repo_path(rest), query)?;
        serde_json::from_value(value)
            .map_err(|e| Error::GitHub(format!("failed to parse {what}: {e}")))
    }
}

impl IssueTracker for GitHubTracker {
    fn list_labeled_issues(&self, label: &str) -> Result<Vec<Issue>> {
        let issues: Vec<GhIssue> = self.get_as(
            "/issues",
            &[("state", "open"), ("labels", label), ("per_page", "100")],
            "issue list",
        )?;

        let issues: Vec<Issue> = issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Issue::from)
            .collect();

        debug!(count = issues.len(), label, "fetched labeled issues");
        Ok(issues)
    }

    fn list_timeline(&self, issue_number: u64) -> Result<Vec<TimelineEvent>> {
        self.get_as(
            &format!("/issues/{issue_number}/timeline"),
            &[("per_page", "100")],
            "timeline",
        )
    }

    fn get_issue(&self, issue_number: u64) -> Result<Issue> {
        let issue: GhIssue = self.get_as(&format!("/issues/{issue_number}"), &[], "issue")?;
        Ok(issue.into())
    }

    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let pr: GhPullRequest = self.get_as(&format!("/pulls/{number}"), &[], "pull request")?;
        Ok(pr.into())
    }

    fn list_comments(&self, issue_number: u64) -> Result<Vec<IssueComment>> {
        self.get_as(
            &format!("/issues/{issue_number}/comments"),
            &[("per_page", "50")],
            "comments",
        )
    }

    fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let prs: Vec<GhPullRequest> = self.get_as(
            "/pulls",
            &[("state", "open"), ("per_page", "100")],
            "pull request list",
        )?;
        Ok(prs.into_iter().map(PullRequest::from).collect())
    }

    fn list_pull_request_files(&self, number: u64) -> Result<Vec<ChangedFile>> {
        self.get_as(
            &format!("/pulls/{number}/files"),
            &[("per_page", "100")],
            "changed files",
        )
    }

    fn create_comment(&self, issue_number: u64, body: &str) -> Result<()> {
        self.client.post(
            &self.repo_path(&format!("/issues/{issue_number}/comments")),
            &serde_json::json!({ "body": body }),
        )?;
        debug!(issue = issue_number, "created comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Canned responses keyed by path plus unencoded query; records every request.
    struct MockGitHubApi {
        responses: Vec<(String, Result<serde_json::Value>)>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockGitHubApi {
        fn new(responses: Vec<(&str, Result<serde_json::Value>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(p, r)| (p.to_string(), r))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn respond(&self, path: &str) -> Result<serde_json::Value> {
            self.calls.lock().unwrap().push(path.to_string());
            match self.responses.iter().find(|(p, _)| p == path) {
                Some((_, Ok(v))) => Ok(v.clone()),
                Some((_, Err(e))) => Err(Error::GitHub(e.to_string())),
                None => Err(Error::GitHub(format!("404 for {path}"))),
            }
        }
    }

    impl GitHubApi for MockGitHubApi {
        fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
            if query.is_empty() {
                return self.respond(path);
            }
            let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.respond(&format!("{path}?{}", pairs.join("&")))
        }

        fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("POST {path} {body}"));
            Ok(serde_json::json!({ "id": 1 }))
        }
    }

    fn tracker(api: MockGitHubApi) -> GitHubTracker {
        GitHubTracker::with_client("acme", "widgets", Box::new(api))
    }

    fn issue_json(number: u64, title: &str, labels: &[&str], body: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": title,
            "body": body,
            "labels": labels.iter().map(|l| serde_json::json!({"name": l})).collect::<Vec<_>>(),
            "html_url": format!("https://github.com/acme/widgets/issues/{number}")
        })
    }

    #[test]
    fn test_list_labeled_issues_skips_pull_requests() {
        let mut pr = issue_json(3, "A PR", &["needs-test"], None);
        pr["pull_request"] = serde_json::json!({"url": "https://api.github.com/repos/acme/widgets/pulls/3"});
        let api = MockGitHubApi::new(vec![(
            "/repos/acme/widgets/issues?state=open&labels=needs-test&per_page=100",
            Ok(serde_json::json!([
                issue_json(1, "Login broken", &["needs-test", "bug"], Some("steps")),
                pr,
                issue_json(2, "No body", &["needs-test"], None),
            ])),
        )]);
        let issues = tracker(api).list_labeled_issues("needs-test").unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].number, 1);
        assert_eq!(issues[0].labels, vec!["needs-test", "bug"]);
        assert_eq!(issues[0].body.as_deref(), Some("steps"));
        assert_eq!(issues[1].body, None);
    }

    #[test]
    fn test_list_labeled_issues_passes_label_as_query_pair() {
        let api = MockGitHubApi::new(vec![(
            "/repos/acme/widgets/issues?state=open&labels=needs qa/smoke&per_page=100",
            Ok(serde_json::json!([])),
        )]);
        let calls = Arc::clone(&api.calls);
        let issues = tracker(api).list_labeled_issues("needs qa/smoke").unwrap();
        assert!(issues.is_empty());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["/repos/acme/widgets/issues?state=open&labels=needs qa/smoke&per_page=100"]
        );
    }

    #[test]
    fn test_list_labeled_issues_error_propagated() {
        let api = MockGitHubApi::new(vec![]);
        let err = tracker(api).list_labeled_issues("needs-test").unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_get_pull_request_parses() {
        let api = MockGitHubApi::new(vec![(
            "/repos/acme/widgets/pulls/42",
            Ok(serde_json::json!({
                "number": 42,
                "title": "Fix login",
                "body": null,
                "html_url": "https://github.com/acme/widgets/pull/42",
                "state": "open"
            })),
        )]);
        let pr = tracker(api).get_pull_request(42).unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.title, "Fix login");
        assert!(pr.body.is_none());
    }

    #[test]
    fn test_list_files_patch_optional() {
        let api = MockGitHubApi::new(vec![(
            "/repos/acme/widgets/pulls/42/files?per_page=100",
            Ok(serde_json::json!([
                {"filename": "src/login.rs", "status": "modified", "patch": "@@ -1 +1 @@\n-a\n+b"},
                {"filename": "logo.png", "status": "added"}
            ])),
        )]);
        let files = tracker(api).list_pull_request_files(42).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].patch.is_some());
        assert!(files[1].patch.is_none());
    }

    #[test]
    fn test_comment_null_body_is_empty() {
        let api = MockGitHubApi::new(vec![(
            "/repos/acme/widgets/issues/7/comments?per_page=50",
            Ok(serde_json::json!([{"id": 1, "body": null}, {"id": 2, "body": "see #9"}])),
        )]);
        let comments = tracker(api).list_comments(7).unwrap();
        assert_eq!(comments[0].body, "");
        assert_eq!(comments[1].body, "see #9");
    }

    #[test]
    fn test_create_comment_posts_body() {
        let api = MockGitHubApi::new(vec![]);
        let calls = Arc::clone(&api.calls);
        tracker(api).create_comment(7, "hello").unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("POST /repos/acme/widgets/issues/7/comments"));
        assert!(calls[0].contains("\"body\":\"hello\""));
    }

    #[test]
    fn test_timeline_linked_pull_request() {
        let events: Vec<TimelineEvent> = serde_json::from_value(serde_json::json!([
            {"event": "labeled", "label": {"name": "needs-test"}},
            {"event": "cross-referenced", "source": {"type": "issue", "issue": {"number": 5}}},
            {"event": "cross-referenced", "source": {"type": "issue", "issue": {
                "number": 12, "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/12"}
            }}},
            {"event": "connected", "source": {"issue": {"number": 13, "pull_request": {}}}},
            {"event": "commented", "body": "hi"}
        ]))
        .unwrap();
        let linked: Vec<Option<u64>> = events
            .iter()
            .map(|e| e.linked_pull_request("acme/widgets"))
            .collect();
        assert_eq!(linked, vec![None, None, Some(12), Some(13), None]);
    }

    #[test]
    fn test_timeline_pull_request_from_other_repo_ignored() {
        let events: Vec<TimelineEvent> = serde_json::from_value(serde_json::json!([
            {"event": "cross-referenced", "source": {"type": "issue", "issue": {
                "number": 3,
                "pull_request": {"url": "https://api.github.com/repos/other/lib/pulls/3"},
                "repository": {"full_name": "other/lib"}
            }}},
            {"event": "cross-referenced", "source": {"type": "issue", "issue": {
                "number": 4,
                "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/4"},
                "repository": {"full_name": "Acme/Widgets"}
            }}}
        ]))
        .unwrap();
        assert_eq!(events[0].linked_pull_request("acme/widgets"), None);
        assert_eq!(events[1].linked_pull_request("acme/widgets"), Some(4));
    }

    #[test]
    fn test_timeline_other_event_with_pr_source_ignored() {
        let event: TimelineEvent = serde_json::from_value(serde_json::json!({
            "event": "mentioned",
            "source": {"issue": {"number": 12, "pull_request": {}}}
        }))
        .unwrap();
        assert_eq!(event.linked_pull_request("acme/widgets"), None);
    }

    #[test]
    fn test_status_error_uses_message() {
        let err = status_error(
            "GET",
            "/repos/acme/widgets/pulls/9",
            404,
            r#"{"message": "Not Found", "documentation_url": "https://docs.github.com"}"#,
        );
        assert_eq!(
            err.to_string(),
            "github error: GET /repos/acme/widgets/pulls/9 returned 404: Not Found"
        );
    }

    #[test]
    fn test_status_error_non_json_body() {
        let err = status_error("POST", "/repos/acme/widgets/issues/7/comments", 502, "<html>");
        assert!(err.to_string().ends_with("returned 502: "));
    }
}
