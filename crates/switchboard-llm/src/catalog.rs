//! Built-in knowledge about each supported backend

use switchboard_config::{ProviderKind, TemplateName};
use url::Url;

use crate::error::LlmError;
use crate::extract::ToolStrategy;
use crate::format::{MessageStyle, PromptFamily};
use crate::wire::WireApi;

/// Defaults for one backend kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub kind: ProviderKind,
    pub wire: WireApi,
    pub endpoint: &'static str,
    /// Calls are refused locally without an API key
    pub requires_key: bool,
    pub tools: ToolStrategy,
    pub template: TemplateName,
    pub message_style: MessageStyle,
    /// Offered when the backend cannot list its models
    pub fallback_models: &'static [&'static str],
}

const fn hosted(
    kind: ProviderKind,
    endpoint: &'static str,
    tools: ToolStrategy,
    fallback_models: &'static [&'static str],
) -> Preset {
    Preset {
        kind,
        wire: WireApi::OpenaiChat,
        endpoint,
        requires_key: true,
        tools,
        template: TemplateName::Messages,
        message_style: MessageStyle {
            system: crate::format::SystemPlacement::Leading,
            tool_role: true,
        },
        fallback_models,
    }
}

const fn local_chat(kind: ProviderKind, endpoint: &'static str, tools: ToolStrategy) -> Preset {
    Preset {
        requires_key: false,
        ..hosted(kind, endpoint, tools, &[])
    }
}

const fn local_raw(kind: ProviderKind, endpoint: &'static str, template: TemplateName) -> Preset {
    Preset {
        wire: WireApi::OpenaiCompletions,
        template,
        ..local_chat(kind, endpoint, ToolStrategy::Emulated)
    }
}

impl Preset {
    pub const fn for_kind(kind: ProviderKind) -> Self {
        use ProviderKind as K;
        use ToolStrategy::{Emulated, Native};

        match kind {
            K::Openai => hosted(kind, "https://api.openai.com/v1", Native, &["gpt-4o-mini", "gpt-4o"]),
            K::Anthropic => Self {
                wire: WireApi::Anthropic,
                message_style: MessageStyle::top_level(),
                ..hosted(
                    kind,
                    "https://api.anthropic.com/v1",
                    Native,
                    &["claude-3-5-sonnet-latest", "claude-3-5-haiku-latest"],
                )
            },
            K::Google => Self {
                wire: WireApi::Google,
                message_style: MessageStyle::top_level(),
                ..hosted(
                    kind,
                    "https://generativelanguage.googleapis.com/v1beta",
                    Native,
                    &["gemini-1.5-flash", "gemini-1.5-pro"],
                )
            },
            K::Mistral => hosted(
                kind,
                "https://api.mistral.ai/v1",
                Native,
                &["mistral-small-latest", "mistral-large-latest"],
            ),
            K::Groq => hosted(
                kind,
                "https://api.groq.com/openai/v1",
                Native,
                &["llama-3.1-8b-instant", "llama-3.3-70b-versatile"],
            ),
            K::Deepseek => hosted(kind, "https://api.deepseek.com/v1", Native, &["deepseek-chat", "deepseek-reasoner"]),
            K::Openrouter => hosted(kind, "https://openrouter.ai/api/v1", Native, &["openrouter/auto"]),
            K::Together => hosted(
                kind,
                "https://api.together.xyz/v1",
                Native,
                &["meta-llama/Llama-3.3-70B-Instruct-Turbo"],
            ),
            K::Fireworks => hosted(
                kind,
                "https://api.fireworks.ai/inference/v1",
                Native,
                &["accounts/fireworks/models/llama-v3p1-8b-instruct"],
            ),
            K::Perplexity => hosted(kind, "https://api.perplexity.ai", Emulated, &["sonar", "sonar-pro"]),
            K::Xai => hosted(kind, "https://api.x.ai/v1", Native, &["grok-2-latest"]),
            K::Cerebras => hosted(kind, "https://api.cerebras.ai/v1", Native, &["llama3.1-8b"]),
            K::Deepinfra => hosted(
                kind,
                "https://api.deepinfra.com/v1/openai",
                Native,
                &["meta-llama/Meta-Llama-3.1-8B-Instruct"],
            ),
            K::Huggingface => hosted(
                kind,
                "https://router.huggingface.co/v1",
                Emulated,
                &["meta-llama/Llama-3.1-8B-Instruct"],
            ),
            K::Lmstudio => local_chat(kind, "http://localhost:1234/v1", Native),
            K::Vllm => local_chat(kind, "http://localhost:8000/v1", Emulated),
            K::Localai => local_chat(kind, "http://localhost:8080/v1", Emulated),
            K::Jan => local_chat(kind, "http://localhost:1337/v1", Emulated),
            K::Llamafile => local_chat(kind, "http://localhost:8080/v1", Emulated),
            K::Ollama => Self {
                wire: WireApi::OllamaChat,
                ..local_chat(kind, "http://localhost:11434", Native)
            },
            K::OllamaRaw => Self {
                wire: WireApi::OllamaGenerate,
                ..local_raw(kind, "http://localhost:11434", TemplateName::Llama3)
            },
            K::Llamacpp => local_raw(kind, "http://localhost:8080/v1", TemplateName::Chatml),
            K::Koboldcpp => local_raw(kind, "http://localhost:5001/v1", TemplateName::Alpaca),
            K::TextgenWebui => local_raw(kind, "http://localhost:5000/v1", TemplateName::Vicuna),
            K::Tabbyapi => local_raw(kind, "http://localhost:5000/v1", TemplateName::Chatml),
        }
    }

    /// # Panics
    ///
    /// Panics if a catalogue endpoint is not a valid URL (should never happen).
    pub fn default_endpoint(&self) -> Url {
        Url::parse(self.endpoint).expect("catalogue endpoints are valid URLs")
    }

    /// Wire API able to carry prompts of `family`
    ///
    /// Chat and raw-prompt endpoints of the `OpenAI` and Ollama dialects are
    /// swapped for one another when the configured template calls for it.
    pub fn wire_for(&self, family: &PromptFamily) -> Result<WireApi, LlmError> {
        match (self.wire, family.is_delimited()) {
            (WireApi::OpenaiChat, true) => Ok(WireApi::OpenaiCompletions),
            (WireApi::OllamaChat, true) => Ok(WireApi::OllamaGenerate),
            (WireApi::OpenaiCompletions, false) => Ok(WireApi::OpenaiChat),
            (WireApi::OllamaGenerate, false) => Ok(WireApi::OllamaChat),
            (WireApi::Anthropic | WireApi::Google, true) => Err(LlmError::Configuration(format!(
                "{} only accepts structured messages, not text templates",
                self.kind
            ))),
            (wire, _) => Ok(wire),
        }
    }
}
