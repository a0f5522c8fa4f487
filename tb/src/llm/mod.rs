//! LLM client module
//!
//! Provides the client trait, provider implementations and the plain
//! prompt-in/text-out helper every pipeline stage goes through.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod openai;
mod transport;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "anthropic" and "openai" providers.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => Err(LlmError::Config(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic, openai",
            other
        ))),
    }
}

/// Send one prompt and return the model's text
///
/// A response with no text (or only whitespace) is an error; the caller
/// decides whether that skips an element or aborts the turn.
pub async fn ask(llm: &dyn LlmClient, system_prompt: &str, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
    debug!(prompt_len = prompt.len(), max_tokens, "ask: called");
    let response = llm
        .complete(CompletionRequest::single(system_prompt, prompt, max_tokens))
        .await?;

    if response.stop_reason == StopReason::MaxTokens {
        tracing::warn!(model = %llm.model(), "ask: response truncated at max tokens");
    }
    debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "ask: usage"
    );

    match response.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::client::mock::MockLlmClient;
    use super::*;

    #[tokio::test]
    async fn test_ask_returns_text() {
        let llm = MockLlmClient::with_texts(&["Learning"]);
        let text = ask(&llm, "", "classify me", 16).await.unwrap();
        assert_eq!(text, "Learning");
        assert_eq!(llm.prompts(), vec!["classify me"]);
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_text() {
        let llm = MockLlmClient::with_texts(&["   "]);
        let err = ask(&llm, "", "x", 16).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("mystery"));
    }
}
