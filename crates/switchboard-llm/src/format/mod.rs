//! Request to backend payload formatting
//!
//! Structured-message backends receive an ordered role/content list; raw
//! text backends receive one string assembled from a delimiter table. The
//! family is chosen by configuration, never by inspecting content.

mod delimited;
mod messages;
mod templates;

use serde::Serialize;
use switchboard_config::{CustomTemplate, TemplateName};

pub use delimited::{DelimiterSet, SystemSlot, TurnDelimiters};
pub use messages::{MessageStyle, SystemPlacement};

use crate::error::LlmError;
use crate::types::{GenerationRequest, Role};

/// One entry of a structured prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Backend-ready prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedPrompt {
    /// Ordered role/content list with an optional top-level system field
    Messages {
        system: Option<String>,
        messages: Vec<FormattedMessage>,
        stop: Vec<String>,
    },
    /// Single delimited string ending in an open assistant turn
    Text { text: String, stop: Vec<String> },
}

impl FormattedPrompt {
    pub fn stop(&self) -> &[String] {
        match self {
            Self::Messages { stop, .. } | Self::Text { stop, .. } => stop,
        }
    }

    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// Template family used by one adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptFamily {
    Messages(MessageStyle),
    Delimited(DelimiterSet),
}

impl PromptFamily {
    /// Resolve a configured template name
    ///
    /// `style` applies only to [`TemplateName::Messages`]; `custom` is
    /// required for [`TemplateName::Custom`].
    pub fn resolve(
        template: TemplateName,
        custom: Option<&CustomTemplate>,
        style: MessageStyle,
    ) -> Result<Self, LlmError> {
        match template {
            TemplateName::Messages => Ok(Self::Messages(style)),
            TemplateName::Custom => custom
                .map(|custom| Self::Delimited(DelimiterSet::from_custom(custom)))
                .ok_or_else(|| LlmError::Configuration("template \"custom\" needs a custom_template table".into())),
            named => DelimiterSet::builtin(named)
                .map(Self::Delimited)
                .ok_or_else(|| LlmError::Configuration(format!("unknown template \"{named}\""))),
        }
    }

    pub const fn is_delimited(&self) -> bool {
        matches!(self, Self::Delimited(_))
    }
}

/// Pure mapping from a [`GenerationRequest`] to a [`FormattedPrompt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormatter {
    family: PromptFamily,
}

impl PromptFormatter {
    pub const fn new(family: PromptFamily) -> Self {
        Self { family }
    }

    pub const fn family(&self) -> &PromptFamily {
        &self.family
    }

    pub fn format(&self, request: &GenerationRequest) -> FormattedPrompt {
        self.format_with_preamble(request, None)
    }

    /// Format with extra system text appended to the request's system prompt
    pub fn format_with_preamble(&self, request: &GenerationRequest, preamble: Option<&str>) -> FormattedPrompt {
        let system = join_system([request.system_prompt.as_deref(), preamble]);

        match self.family {
            PromptFamily::Messages(style) => {
                let (system, messages) = messages::render(style, system, &request.turns());
                FormattedPrompt::Messages {
                    system,
                    messages,
                    stop: request.stop_sequences.clone().unwrap_or_default(),
                }
            }
            PromptFamily::Delimited(ref set) => FormattedPrompt::Text {
                text: set.render(system, &request.turns()),
                stop: request
                    .stop_sequences
                    .clone()
                    .unwrap_or_else(|| set.default_stop()),
            },
        }
    }
}

/// Join non-empty system fragments with a blank line
fn join_system<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (!joined.is_empty()).then_some(joined)
}
