pub mod completion;
pub mod providers;
pub mod retry;
pub mod streaming;

use braid_core::config::{AppConfig, ModelConfig, RetryConfig};
use braid_core::error::{BraidError, Result};
use braid_core::traits::LlmClient;

pub use completion::LlmCompletion;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" => Ok(Box::new(OpenAiClient::new())),
        other if providers::presets::get_preset(other).is_some() => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(BraidError::UnsupportedProvider(other.to_string())),
    }
}

/// Build the completion service for a model, wrapping it in retries and
/// fallbacks when the config asks for them.
pub fn completion_for(
    model: &ModelConfig,
    fallback_models: &[ModelConfig],
) -> Result<LlmCompletion> {
    let primary = create_client(model)?;

    if fallback_models.is_empty() && model.retry.is_none() {
        return Ok(LlmCompletion::new(primary, model.clone()));
    }

    let retry_config = model.retry.clone().unwrap_or_else(RetryConfig::default);
    let fallbacks = fallback_models
        .iter()
        .map(|mc| Ok((mc.clone(), create_client(mc)?)))
        .collect::<Result<Vec<_>>>()?;

    let client = RetryingClient::new(primary, fallbacks, retry_config);
    Ok(LlmCompletion::new(Box::new(client), model.clone()))
}

/// Completion service for the top-level `[model]` of an app config.
pub fn completion_from_config(config: &AppConfig) -> Result<LlmCompletion> {
    completion_for(&config.model, &config.fallback_models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_known_providers() {
        for provider in ["openai", "ollama", "groq", "openrouter"] {
            let mut config = ModelConfig::new("m");
            config.provider = provider.to_string();
            assert!(create_client(&config).is_ok(), "{provider} should be supported");
        }
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let mut config = ModelConfig::new("m");
        config.provider = "carrier-pigeon".to_string();
        let err = create_client(&config).err().unwrap();
        assert!(matches!(err, BraidError::UnsupportedProvider(p) if p == "carrier-pigeon"));
    }
}
