use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// A chat-style completion request: one system and one user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: &str, system: &str, user: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
        }
    }
}

pub trait CompletionClient {
    /// Generated text for `request`.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Extract `choices[0].message.content` from a chat completion response body.
pub fn parse_completion(body: serde_json::Value) -> Result<String> {
    if let Some(err) = body.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(Error::Llm(format!("completion API error: {message}")));
    }

    let response: CompletionResponse = serde_json::from_value(body)
        .map_err(|e| Error::Llm(format!("failed to parse completion response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Llm("completion response contained no text".to_string()))
}

/// Error for a non-2xx completion response, with `error.message` when present.
fn status_error(code: u16, body: &str) -> Error {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_default();
    Error::Llm(format!("completion request returned {code}: {detail}"))
}

/// OpenAI-compatible `/chat/completions` client. One attempt per call.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, max_tokens = request.max_tokens, "requesting completion");

        match self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(request)
        {
            Ok(response) => {
                let body: serde_json::Value = response.into_json().map_err(|e| {
                    Error::Llm(format!("failed to read completion response: {e}"))
                })?;
                parse_completion(body)
            }
            Err(ureq::Error::Status(code, response)) => {
                Err(status_error(code, &response.into_string().unwrap_or_default()))
            }
            Err(e) => Err(Error::Llm(format!("completion request failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_chat_shape() {
        let req = CompletionRequest::new("gpt-4o", "be QA", "summarize", 300);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be QA"},
                    {"role": "user", "content": "summarize"}
                ],
                "max_tokens": 300
            })
        );
    }

    #[test]
    fn test_parse_completion_first_choice() {
        let body = serde_json::json!({
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  Test login.  \n"}},
                {"index": 1, "message": {"role": "assistant", "content": "other"}}
            ]
        });
        assert_eq!(parse_completion(body).unwrap(), "Test login.");
    }

    #[test]
    fn test_parse_completion_no_choices() {
        let err = parse_completion(serde_json::json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("no text"));
    }

    #[test]
    fn test_parse_completion_null_content() {
        let body = serde_json::json!({"choices": [{"message": {"content": null}}]});
        assert!(parse_completion(body).is_err());
    }

    #[test]
    fn test_parse_completion_api_error() {
        let body = serde_json::json!({"error": {"message": "quota exceeded", "type": "insufficient_quota"}});
        let err = parse_completion(body).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_parse_completion_malformed() {
        let err = parse_completion(serde_json::json!({"choices": "nope"})).unwrap_err();
        assert!(err.to_string().contains("failed to parse completion response"));
    }

    #[test]
    fn test_status_error_includes_api_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(
            status_error(401, body).to_string(),
            "llm error: completion request returned 401: Incorrect API key provided"
        );
    }

    #[test]
    fn test_status_error_unparseable_body() {
        assert_eq!(
            status_error(503, "upstream unavailable").to_string(),
            "llm error: completion request returned 503: "
        );
    }
}
