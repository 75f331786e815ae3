//! Programmatic configuration and registry setup for integration tests

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use switchboard_config::{LlmConfig, ProviderConfig, ProviderKind, RetryConfig, TemplateName, ToolMode};
use switchboard_llm::{HttpTransport, ProviderAdapter, ProviderRegistry};

/// Builder for test configurations with fast retries
pub struct ConfigBuilder {
    config: LlmConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LlmConfig {
                retry: RetryConfig {
                    max_retries: 2,
                    initial_delay: "10ms".to_owned(),
                    backoff_multiplier: 2.0,
                    jitter: false,
                },
                ..LlmConfig::default()
            },
        }
    }

    /// Add a provider of `kind` pointed at `endpoint`
    pub fn with_provider(self, id: &str, kind: ProviderKind, endpoint: &str) -> Self {
        self.with_provider_config(id, provider(kind, endpoint))
    }

    pub fn with_provider_config(mut self, id: &str, provider: ProviderConfig) -> Self {
        self.config.providers.insert(id.to_owned(), provider);
        self
    }

    pub fn build(self) -> LlmConfig {
        self.config
    }

    /// Registry over the real HTTP transport
    pub fn registry(self) -> ProviderRegistry {
        ProviderRegistry::from_config(&self.config, Arc::new(transport())).expect("valid test configuration")
    }
}

/// Provider with a test key and model
pub fn provider(kind: ProviderKind, endpoint: &str) -> ProviderConfig {
    let mut config = ProviderConfig::new(kind);
    config.api_key = Some(SecretString::from("test-key"));
    config.api_endpoint = Some(endpoint.parse().expect("valid URL"));
    config.default_model = Some("mock-model-1".to_owned());
    config
}

/// Provider rendering prompts through a text template
pub fn templated(kind: ProviderKind, endpoint: &str, template: TemplateName) -> ProviderConfig {
    let mut config = provider(kind, endpoint);
    config.template = Some(template);
    config
}

/// Provider forced onto emulated tool calling
pub fn emulated(kind: ProviderKind, endpoint: &str) -> ProviderConfig {
    let mut config = provider(kind, endpoint);
    config.tool_strategy = Some(ToolMode::Emulated);
    config
}

pub fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(2), Duration::from_secs(10)).expect("client builds")
}

pub fn adapter(registry: &ProviderRegistry, id: &str) -> Arc<dyn ProviderAdapter> {
    registry.get(id).expect("provider is registered")
}
