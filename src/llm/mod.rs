//! LLM integration.
//!
//! A single backend, Google Gemini, reached through its REST API. The rest of
//! the bot only sees the [`LlmProvider`] trait.

pub mod gemini;
pub mod provider;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using Gemini (model: {})", config.model);
    Arc::new(GeminiProvider::new(
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_reports_model() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: "gemini-1.5-flash".to_string(),
            base_url: gemini::DEFAULT_BASE_URL.to_string(),
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "gemini-1.5-flash");
    }
}
