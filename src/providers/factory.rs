use crate::config::{AppConfig, ProviderConfig};
use crate::providers::{AnthropicProvider, LlmProvider, OpenAIProvider, ProviderError};
use std::time::Duration;

pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider instance from configuration
    pub fn create(
        provider_name: &str,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Box<dyn LlmProvider>, ProviderError> {
        // Validate that provider is enabled
        if !config.enabled {
            return Err(format!(
                "Provider '{}' is not enabled in configuration",
                provider_name
            )
            .into());
        }

        match provider_name {
            "anthropic" => Ok(Box::new(AnthropicProvider::new(config, timeout)?)),
            "openai" => Ok(Box::new(OpenAIProvider::new(config, timeout)?)),
            _ => Err(format!("Unknown provider: {}", provider_name).into()),
        }
    }

    /// Get the default provider from configuration
    ///
    /// A provider missing from the `[providers]` table is still created with
    /// its default model, so an API key in the environment is enough.
    pub fn get_default_provider(config: &AppConfig) -> Result<Box<dyn LlmProvider>, ProviderError> {
        let provider_name = &config.default_provider;
        let timeout = Duration::from_secs(config.timeout);

        if let Some(provider_config) = config.providers.get(provider_name) {
            return Self::create(provider_name, provider_config, timeout);
        }

        let model = Self::default_model(provider_name).ok_or_else(|| {
            format!(
                "Default provider '{}' not found in configuration",
                provider_name
            )
        })?;
        let provider_config = ProviderConfig {
            enabled: true,
            model: model.to_string(),
            temperature: 0.2,
            max_tokens: 4000,
            api_key: None,
            base_url: None,
        };
        Self::create(provider_name, &provider_config, timeout)
    }

    /// List all available provider names
    pub fn available_providers() -> Vec<&'static str> {
        vec!["anthropic", "openai"]
    }

    /// Default model for a provider when only an API key is known
    pub fn default_model(provider_name: &str) -> Option<&'static str> {
        match provider_name {
            "anthropic" => Some("claude-sonnet-4-20250514"),
            "openai" => Some("gpt-4o"),
            _ => None,
        }
    }
}
