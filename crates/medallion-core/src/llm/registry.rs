//! Provider registry for runtime provider lookup.
//!
//! A name-indexed registry of boxed providers. It is populated once while the
//! executor is being built and is read-only afterwards, so runs sharing one
//! executor always see the same providers.

use std::collections::HashMap;

use super::box_provider::BoxLlmProvider;

/// Registry of available providers, indexed by the name agents refer to.
pub struct ProviderRegistry {
    providers: HashMap<String, BoxLlmProvider>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under the given name.
    ///
    /// If a provider with this name already exists, it is replaced.
    pub fn register(&mut self, name: impl Into<String>, provider: BoxLlmProvider) {
        self.providers.insert(name.into(), provider);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, provider: BoxLlmProvider) -> Self {
        self.register(name, provider);
        self
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&BoxLlmProvider> {
        self.providers.get(name)
    }

    /// Registered provider names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Close every provider. A failure is logged and does not stop the
    /// remaining providers from closing; returns how many failed.
    pub async fn close_all(&self) -> usize {
        let mut failures = 0;
        for (name, provider) in &self.providers {
            if let Err(e) = provider.close().await {
                tracing::warn!(provider = name.as_str(), error = %e, "failed to close provider");
                failures += 1;
            }
        }
        failures
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
