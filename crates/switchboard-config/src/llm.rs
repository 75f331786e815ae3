use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Retry policy applied to every provider unless overridden
    #[serde(default)]
    pub retry: RetryConfig,
    /// HTTP transport settings shared by all providers
    #[serde(default)]
    pub transport: TransportConfig,
    /// Provider configurations keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}

/// Configuration for a single provider id
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Backend this provider id talks to
    pub kind: ProviderKind,
    /// API key attached to outgoing requests
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Endpoint override (defaults to the backend's well-known URL)
    #[serde(default)]
    pub api_endpoint: Option<Url>,
    /// Model used when a request leaves `model_id` empty
    #[serde(default)]
    pub default_model: Option<String>,
    /// Backend-specific request fields merged into every payload
    #[serde(default)]
    pub extra_options: serde_json::Map<String, serde_json::Value>,
    /// Prompt template override
    #[serde(default)]
    pub template: Option<TemplateName>,
    /// Delimiters for `template = "custom"`
    #[serde(default)]
    pub custom_template: Option<CustomTemplate>,
    /// Tool-calling strategy override
    #[serde(default)]
    pub tool_strategy: Option<ToolMode>,
    /// Per-provider retry override
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ProviderConfig {
    /// Minimal configuration for a backend kind
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            api_endpoint: None,
            default_model: None,
            extra_options: serde_json::Map::new(),
            template: None,
            custom_template: None,
            tool_strategy: None,
            retry: None,
        }
    }

    /// Snapshot of the connection settings an adapter consumes
    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            api_key: self.api_key.clone(),
            api_endpoint: self.api_endpoint.clone(),
            default_model: self.default_model.clone(),
            extra_options: self.extra_options.clone(),
        }
    }
}

/// Resolved connection settings for one provider
///
/// Adapters hold this behind a single reference and replace it wholesale on
/// reload; it is never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<SecretString>,
    pub api_endpoint: Option<Url>,
    pub default_model: Option<String>,
    pub extra_options: serde_json::Map<String, serde_json::Value>,
}

/// Supported backends
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Google,
    Mistral,
    Groq,
    Deepseek,
    Openrouter,
    Together,
    Fireworks,
    Perplexity,
    Xai,
    Cerebras,
    Deepinfra,
    Huggingface,
    Lmstudio,
    Vllm,
    Localai,
    Jan,
    Llamafile,
    /// Ollama chat endpoint
    Ollama,
    /// Ollama raw generate endpoint (templated locally)
    OllamaRaw,
    Llamacpp,
    Koboldcpp,
    TextgenWebui,
    Tabbyapi,
}

/// Named prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateName {
    /// Structured role/content messages
    Messages,
    Llama2,
    Mistral,
    Chatml,
    Llama3,
    Gemma,
    /// `<|system|>` / `<|user|>` / `<|assistant|>` tags
    RoleTags,
    /// `USER:` / `ASSISTANT:` labels
    Vicuna,
    Alpaca,
    /// Delimiters taken from `custom_template`
    Custom,
}

/// User-supplied delimiter table for raw-text backends
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomTemplate {
    /// Emitted once before the first turn
    #[serde(default)]
    pub preamble: String,
    #[serde(default)]
    pub system_prefix: String,
    #[serde(default)]
    pub system_suffix: String,
    /// Fold the system text into the first user turn instead of a separate block
    #[serde(default)]
    pub fold_system: bool,
    #[serde(default)]
    pub user_prefix: String,
    #[serde(default)]
    pub user_suffix: String,
    #[serde(default)]
    pub assistant_prefix: String,
    #[serde(default)]
    pub assistant_suffix: String,
    /// Tool turns are rendered as assistant turns when absent
    #[serde(default)]
    pub tool_prefix: Option<String>,
    #[serde(default)]
    pub tool_suffix: Option<String>,
    /// Open assistant marker; defaults to `assistant_prefix`
    #[serde(default)]
    pub generation_prompt: Option<String>,
    /// Default stop sequences
    #[serde(default)]
    pub stop: Vec<String>,
}

/// How tool invocations are obtained from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Backend returns structured function calls
    Native,
    /// Model is instructed to answer with a JSON object
    Emulated,
}

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (e.g. "500ms", "2s")
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,
    /// Growth factor between consecutive delays, at least 1
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Randomise delays by up to ten percent
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Parsed initial delay
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn initial_delay(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.initial_delay)
    }
}

const fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> String {
    "500ms".to_owned()
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Connection establishment timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    /// Timeout for non-streaming requests and for a stream's response headers
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl TransportConfig {
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn connect_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.connect_timeout)
    }

    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.request_timeout)
    }
}

fn default_connect_timeout() -> String {
    "10s".to_owned()
}

fn default_request_timeout() -> String {
    "300s".to_owned()
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid duration '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use secrecy::ExposeSecret;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn provider_with_defaults() {
        let config: ProviderConfig = toml::from_str(r#"kind = "ollama""#).unwrap();
        assert_eq!(config.kind, ProviderKind::Ollama);
        assert!(config.api_key.is_none());
        assert!(config.template.is_none());
        assert!(config.extra_options.is_empty());
    }

    #[test]
    fn provider_with_everything() {
        let config: ProviderConfig = toml::from_str(indoc! {r#"
            kind = "llamacpp"
            api_key = "secret"
            api_endpoint = "http://gpu-box:8080/v1"
            default_model = "qwen2.5-7b"
            template = "custom"
            tool_strategy = "emulated"

            [extra_options]
            top_k = 40
            mirostat = 2

            [custom_template]
            user_prefix = "<|user|>\n"
            user_suffix = "\n"
            assistant_prefix = "<|assistant|>\n"
            stop = ["<|user|>"]

            [retry]
            max_retries = 5
            initial_delay = "1s"
        "#})
        .unwrap();

        assert_eq!(config.kind, ProviderKind::Llamacpp);
        assert_eq!(config.api_key.as_ref().unwrap().expose_secret(), "secret");
        assert_eq!(config.api_endpoint.as_ref().unwrap().as_str(), "http://gpu-box:8080/v1");
        assert_eq!(config.template, Some(TemplateName::Custom));
        assert_eq!(config.tool_strategy, Some(ToolMode::Emulated));
        assert_eq!(config.extra_options["top_k"], 40);

        let custom = config.custom_template.as_ref().unwrap();
        assert_eq!(custom.user_prefix, "<|user|>\n");
        assert_eq!(custom.generation_prompt, None);

        let retry = config.retry.as_ref().unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay().unwrap(), Duration::from_secs(1));
        assert!((retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = toml::from_str::<ProviderConfig>(indoc! {r#"
            kind = "openai"
            apikey = "typo"
        "#});
        assert!(result.is_err());
    }

    #[test]
    fn settings_snapshot_copies_connection_fields() {
        let mut config = ProviderConfig::new(ProviderKind::Groq);
        config.default_model = Some("llama-3.1-8b-instant".to_owned());
        config.api_key = Some(SecretString::from("gsk-test"));

        let settings = config.settings();
        assert_eq!(settings.default_model.as_deref(), Some("llama-3.1-8b-instant"));
        assert_eq!(settings.api_key.unwrap().expose_secret(), "gsk-test");
    }

    #[test]
    fn kind_names_round_trip_through_strum() {
        for kind in ProviderKind::iter() {
            assert_eq!(ProviderKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert_eq!(ProviderKind::OllamaRaw.to_string(), "ollama_raw");
        assert_eq!(ProviderKind::TextgenWebui.to_string(), "textgen_webui");
    }

    #[test]
    fn transport_defaults_parse() {
        let transport = TransportConfig::default();
        assert_eq!(transport.connect_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(transport.request_timeout().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn malformed_duration_is_reported() {
        let retry = RetryConfig {
            initial_delay: "soon".to_owned(),
            ..RetryConfig::default()
        };
        let err = retry.initial_delay().unwrap_err();
        assert!(err.to_string().contains("soon"));
    }
}
