use crate::error::Error;

pub const ISSUE_ANALYSIS_HEADER: &str = "LLM QA analysis:";
pub const ISSUE_FAILURE_PREFIX: &str = "Failed to generate LLM QA analysis:";
pub const NO_ASSOCIATION_NOTICE: &str = "No associated pull request found for this issue.";

/// What happened when summarizing the associated pull request.
#[derive(Debug)]
pub enum PrSection {
    /// The resolver found no pull request.
    NotFound,
    Summary { number: u64, text: String },
    Failed { number: u64, error: Error },
}

/// Assemble the comment posted on an issue: the issue analysis (or its
/// failure), then the PR summary (or its failure, or the no-PR notice).
pub fn build_comment(issue_summary: &Result<String, Error>, pr: &PrSection) -> String {
    let mut body = String::new();

    match issue_summary {
        Ok(text) => body.push_str(&format!("{ISSUE_ANALYSIS_HEADER}\n\n{text}\n\n")),
        Err(e) => body.push_str(&format!("{ISSUE_FAILURE_PREFIX} {e}\n\n")),
    }

    match pr {
        PrSection::NotFound => body.push_str(&format!("{NO_ASSOCIATION_NOTICE}\n\n")),
        PrSection::Summary { number, text } => {
            body.push_str(&format!("Associated PR (#{number}) summary:\n\n{text}\n\n"))
        }
        PrSection::Failed { number, error } => body.push_str(&format!(
            "Failed to analyze associated PR (#{number}): {error}\n\n"
        )),
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_comment() {
        let body = build_comment(
            &Ok("Verify login.".to_string()),
            &PrSection::Summary {
                number: 42,
                text: "Rewires the button.".to_string(),
            },
        );
        assert_eq!(
            body,
            "LLM QA analysis:\n\nVerify login.\n\nAssociated PR (#42) summary:\n\nRewires the button.\n\n"
        );
    }

    #[test]
    fn test_issue_failure_embedded() {
        let body = build_comment(
            &Err(Error::Llm("completion request returned 401: bad key".to_string())),
            &PrSection::NotFound,
        );
        assert!(body.starts_with("Failed to generate LLM QA analysis: llm error: completion request returned 401"));
        assert!(body.contains(NO_ASSOCIATION_NOTICE));
    }

    #[test]
    fn test_no_association_has_no_pr_section() {
        let body = build_comment(&Ok("ok".to_string()), &PrSection::NotFound);
        assert!(body.ends_with("No associated pull request found for this issue.\n\n"));
        assert!(!body.contains("Associated PR"));
    }

    #[test]
    fn test_pr_failure_embedded() {
        let body = build_comment(
            &Ok("ok".to_string()),
            &PrSection::Failed {
                number: 42,
                error: Error::GitHub("GET /pulls/42/files failed".to_string()),
            },
        );
        assert!(body.contains("Failed to analyze associated PR (#42): github error: GET /pulls/42/files failed"));
    }
}
