//! Text-generation provider implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `medallion-core`: a local Ollama backend and a hosted OpenAI-compatible
//! backend. [`create_provider`] builds one from a [`ProviderConfig`] and
//! [`build_registry`] builds the executor's registry from the global config.
//!
//! [`LlmProvider`]: medallion_core::llm::provider::LlmProvider

mod http;
pub mod ollama;
pub mod openai;

#[cfg(test)]
pub(crate) mod test_support;

use secrecy::SecretString;

use medallion_core::llm::box_provider::BoxLlmProvider;
use medallion_core::llm::registry::ProviderRegistry;
use medallion_types::config::GlobalConfig;
use medallion_types::llm::{LlmError, ProviderConfig, ProviderKind};

use self::ollama::OllamaProvider;
use self::openai::OpenAiProvider;

/// Resolve the API key of a registration: inline `api_key` first, then the
/// environment variable named by `api_key_env`.
fn resolve_api_key(name: &str, config: &ProviderConfig) -> Result<Option<SecretString>, LlmError> {
    if let Some(key) = &config.api_key {
        return Ok(Some(SecretString::from(key.clone())));
    }

    match &config.api_key_env {
        Some(var) => match std::env::var(var) {
            Ok(key) if !key.is_empty() => Ok(Some(SecretString::from(key))),
            _ => Err(LlmError::Configuration(format!(
                "provider '{name}': environment variable {var} is not set"
            ))),
        },
        None => Ok(None),
    }
}

/// Create a [`BoxLlmProvider`] for the registration `name`.
///
/// # Errors
///
/// Returns [`LlmError::Configuration`] when an OpenAI registration has no API
/// key or a configured header is invalid.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<BoxLlmProvider, LlmError> {
    match config.kind {
        ProviderKind::Ollama => {
            if config.api_key.is_some() || config.api_key_env.is_some() {
                tracing::debug!(provider = name, "ollama provider ignores api keys");
            }
            Ok(BoxLlmProvider::new(OllamaProvider::new(config)?))
        }
        ProviderKind::Openai => {
            let key = resolve_api_key(name, config)?.ok_or_else(|| {
                LlmError::Configuration(format!(
                    "provider '{name}' requires api_key or api_key_env"
                ))
            })?;
            Ok(BoxLlmProvider::new(OpenAiProvider::new(config, key)?))
        }
    }
}

/// Build the provider registry from every `[providers.<name>]` table.
///
/// Fails on the first registration that cannot be constructed so a
/// misconfigured provider surfaces before any run starts.
pub fn build_registry(config: &GlobalConfig) -> Result<ProviderRegistry, LlmError> {
    let mut registry = ProviderRegistry::new();
    for (name, provider_config) in &config.providers {
        let provider = create_provider(name, provider_config)?;
        tracing::info!(
            provider = name.as_str(),
            kind = %provider_config.kind,
            model = %provider_config.model,
            base_url = %provider_config.effective_base_url(),
            max_retries = provider_config.max_retries,
            "registered provider"
        );
        registry.register(name.clone(), provider);
    }
    Ok(registry)
}
