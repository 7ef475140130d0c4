//! Provider registry
//!
//! Maps provider names to clients and resolves model ids to a provider.
//! Constructed once by the embedding application and passed to agent builders.

use std::collections::HashMap;
use std::sync::Arc;

use super::client::LlmClient;
use crate::error::{MeshError, Result};

const VENDOR_PREFIXES: &[(&str, &str)] = &[
    ("claude", "anthropic"),
    ("gpt", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("llama", "ollama"),
    ("mistral", "ollama"),
];

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    // Registration order decides the fallback provider
    providers: Vec<(String, Arc<dyn LlmClient>)>,
    model_map: HashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn LlmClient>) {
        let name = name.into();
        match self.providers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                log::warn!("Provider '{}' re-registered, replacing previous client", name);
                slot.1 = client;
            }
            None => {
                log::debug!("Registered provider '{}'", name);
                self.providers.push((name, client));
            }
        }
    }

    /// Pin a bare model id to a provider
    pub fn map_model(&mut self, model: impl Into<String>, provider: impl Into<String>) {
        self.model_map.insert(model.into(), provider.into());
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmClient>> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, client)| Arc::clone(client))
            .ok_or_else(|| MeshError::UnknownProvider(name.to_string()))
    }

    /// Resolve `"provider/model"` or a bare `"model"` to a client and model name.
    ///
    /// Bare ids go through the model map, then vendor prefixes, then the first
    /// registered provider.
    pub fn resolve(&self, model_id: &str) -> Result<(Arc<dyn LlmClient>, String)> {
        if let Some((provider, model)) = model_id.split_once('/') {
            return Ok((self.get(provider)?, model.to_string()));
        }

        if let Some(provider) = self.model_map.get(model_id) {
            return Ok((self.get(provider)?, model_id.to_string()));
        }

        for (prefix, provider) in VENDOR_PREFIXES {
            if model_id.starts_with(prefix)
                && let Ok(client) = self.get(provider)
            {
                return Ok((client, model_id.to_string()));
            }
        }

        self.providers
            .first()
            .map(|(_, client)| (Arc::clone(client), model_id.to_string()))
            .ok_or_else(|| MeshError::UnknownProvider(model_id.to_string()))
    }

    /// Provider names in registration order
    pub fn available(&self) -> Vec<String> {
        self.providers.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available())
            .field("model_map", &self.model_map)
            .finish()
    }
}
