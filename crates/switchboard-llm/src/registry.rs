//! Adapters keyed by provider id

use std::sync::Arc;

use dashmap::DashMap;
use switchboard_config::{CustomTemplate, LlmConfig, ProviderConfig, ProviderKind, RetryConfig, TemplateName, ToolMode};

use crate::adapter::{Adapter, ProviderAdapter};
use crate::error::LlmError;
use crate::transport::Transport;

/// Configuration that shapes how an adapter is built
///
/// Any change here needs a rebuild; everything else is swapped in place.
#[derive(Debug, Clone, PartialEq)]
struct Shape {
    kind: ProviderKind,
    template: Option<TemplateName>,
    custom_template: Option<CustomTemplate>,
    tool_strategy: Option<ToolMode>,
    retry: RetryConfig,
}

impl Shape {
    fn of(config: &ProviderConfig, default_retry: &RetryConfig) -> Self {
        Self {
            kind: config.kind,
            template: config.template,
            custom_template: config.custom_template.clone(),
            tool_strategy: config.tool_strategy,
            retry: config.retry.clone().unwrap_or_else(|| default_retry.clone()),
        }
    }
}

struct Entry {
    adapter: Arc<dyn ProviderAdapter>,
    shape: Option<Shape>,
}

/// Concurrent map of provider id to adapter
pub struct ProviderRegistry {
    adapters: DashMap<String, Entry>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.ids()).finish()
    }
}

impl ProviderRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            adapters: DashMap::new(),
            transport,
        }
    }

    /// Build one adapter per configured provider
    pub fn from_config(config: &LlmConfig, transport: Arc<dyn Transport>) -> Result<Self, LlmError> {
        let registry = Self::new(transport);

        for (id, provider) in &config.providers {
            let entry = registry.build(id, provider, &config.retry)?;
            registry.adapters.insert(id.clone(), entry);
        }

        tracing::info!(providers = registry.len(), "provider registry ready");
        Ok(registry)
    }

    fn build(&self, id: &str, config: &ProviderConfig, default_retry: &RetryConfig) -> Result<Entry, LlmError> {
        let adapter = Adapter::from_config(id, config, default_retry, Arc::clone(&self.transport))?;
        tracing::debug!(provider = %id, adapter = ?adapter, "adapter built");

        Ok(Entry {
            adapter: Arc::new(adapter),
            shape: Some(Shape::of(config, default_retry)),
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).map(|entry| Arc::clone(&entry.adapter))
    }

    /// Provider ids in lexical order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.iter().map(|entry| entry.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Register an adapter built outside of configuration
    ///
    /// Such adapters are left alone by [`reload`](Self::reload) unless the
    /// new configuration names the same id.
    pub fn insert(&self, id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .insert(id.into(), Entry { adapter, shape: None })
            .map(|previous| previous.adapter)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.remove(id).map(|(_, entry)| entry.adapter)
    }

    /// Apply a new configuration
    ///
    /// Providers whose kind, template, tool strategy and retry settings are
    /// unchanged keep their adapter and get the new settings snapshot; others
    /// are rebuilt. Configured providers missing from `config` are removed.
    /// Nothing changes if any adapter fails to build.
    pub fn reload(&self, config: &LlmConfig) -> Result<(), LlmError> {
        let mut rebuilt = Vec::new();
        let mut refreshed = Vec::new();

        for (id, provider) in &config.providers {
            let shape = Shape::of(provider, &config.retry);
            let unchanged = self
                .adapters
                .get(id)
                .is_some_and(|entry| entry.shape.as_ref() == Some(&shape));

            if unchanged {
                refreshed.push((id, provider.settings()));
            } else {
                rebuilt.push((id.clone(), self.build(id, provider, &config.retry)?));
            }
        }

        let stale: Vec<String> = self
            .adapters
            .iter()
            .filter(|entry| entry.shape.is_some() && !config.providers.contains_key(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for (id, settings) in refreshed {
            if let Some(entry) = self.adapters.get(id) {
                entry.adapter.reload(settings);
            }
        }
        for (id, entry) in rebuilt {
            tracing::info!(provider = %id, "provider rebuilt");
            self.adapters.insert(id, entry);
        }
        for id in stale {
            tracing::info!(provider = %id, "provider removed");
            self.adapters.remove(&id);
        }

        Ok(())
    }
}
