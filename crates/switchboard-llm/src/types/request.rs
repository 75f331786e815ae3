use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{ConversationMessage, ToolSet};

/// A single text-generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model to use; empty means the adapter's default model
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Single-turn prompt, used only when `history` is empty
    #[serde(default)]
    pub prompt: String,
    /// Prior turns in chronological order; supersedes `prompt` when non-empty
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Overrides the template's stop sequences; an empty list disables them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub tool_definitions: ToolSet,
}

impl GenerationRequest {
    /// Single-prompt request for `model_id`
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Conversation turns to send
    ///
    /// `history` when present, otherwise the prompt as a lone user turn.
    pub fn turns(&self) -> Cow<'_, [ConversationMessage]> {
        if self.history.is_empty() {
            Cow::Owned(vec![ConversationMessage::user(self.prompt.clone())])
        } else {
            Cow::Borrowed(&self.history)
        }
    }
}
