//! Google Gemini provider: `models/{model}:generateContent` over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

/// Public Generative Language API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "gemini";

/// Gemini text generation over the REST API.
pub struct GeminiProvider {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }]
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::debug!(model = %self.model, prompt_len = request.prompt.len(), "Sending Gemini request");

        let resp = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, model = %self.model, "Gemini request failed");
            return Err(status_error(status, retry_after, body));
        }

        let raw = resp.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        parse_response(&raw)
    }
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited {
            provider: PROVIDER.into(),
            retry_after,
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        LlmError::AuthFailed {
            provider: PROVIDER.into(),
        }
    } else {
        LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("HTTP {status}: {body}"),
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Extract the first candidate's text. No candidates means empty output, not
/// an error (e.g. the prompt was blocked).
fn parse_response(raw: &str) -> Result<CompletionResponse, LlmError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Ok(CompletionResponse {
            content: String::new(),
            finish_reason: FinishReason::Other("NO_CANDIDATES".into()),
        });
    };

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(FinishReason::from_api)
        .unwrap_or(FinishReason::Stop);

    Ok(CompletionResponse {
        content,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            SecretString::from("test-key"),
            "gemini-1.5-pro",
            "https://example.test/v1beta/",
        )
    }

    #[test]
    fn url_includes_model_and_trims_slash() {
        assert_eq!(
            provider().generate_url(),
            "https://example.test/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn body_wraps_prompt_as_single_user_turn() {
        let body = GeminiProvider::request_body(&CompletionRequest::new("hello"));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_and_joins_text_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "world"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.content, "Hello world");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn no_candidates_is_empty_output() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let resp = parse_response(raw).unwrap();
        assert!(resp.content.is_empty());
    }

    #[test]
    fn candidate_without_content_is_empty_output() {
        let raw = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let resp = parse_response(raw).unwrap();
        assert!(resp.content.is_empty());
        assert_eq!(resp.finish_reason, FinishReason::Safety);
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_response("<html>").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), String::new()),
            LlmError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, String::new()),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, None, "boom".into()),
            LlmError::RequestFailed { ref reason, .. } if reason.contains("boom")
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_request_failure() {
        let provider = GeminiProvider::new(SecretString::from("k"), "m", "http://127.0.0.1:9");
        let err = provider
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
