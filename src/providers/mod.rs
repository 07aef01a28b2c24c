mod anthropic;
mod factory;
mod fallback;
mod open_ai;

pub use anthropic::AnthropicProvider;
pub use factory::ProviderFactory;
pub use fallback::FallbackProvider;
pub use open_ai::OpenAIProvider;

use async_trait::async_trait;
use std::error::Error;

/// Error type returned by provider calls
pub type ProviderError = Box<dyn Error + Send + Sync>;

/// A reply together with the model that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Unified trait for all LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn provider_name(&self) -> &str;

    /// Model identifier used for requests, recorded on saved recipes
    fn model(&self) -> &str;

    /// Send a system prompt plus user content and return the text reply
    async fn complete(&self, system_prompt: &str, content: &str) -> Result<String, ProviderError>;

    /// Like [`LlmProvider::complete`], also naming the model that answered
    async fn complete_with_model(
        &self,
        system_prompt: &str,
        content: &str,
    ) -> Result<Completion, ProviderError> {
        let text = self.complete(system_prompt, content).await?;
        Ok(Completion {
            text,
            model: self.model().to_string(),
        })
    }
}
