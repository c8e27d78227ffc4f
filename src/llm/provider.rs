//! The `LlmProvider` trait and its request/response types.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single-prompt text generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Safety,
    Other(String),
}

impl FinishReason {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::Length,
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" => Self::Safety,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Generated text. `content` may be empty if the backend produced nothing.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
}

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Generate a reply to a single prompt. One attempt, no retries.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
