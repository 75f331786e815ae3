use serde::{Deserialize, Serialize};

use super::ToolCallRequest;
use crate::error::LlmError;

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of output or a stop sequence
    Stop,
    /// Token limit reached
    Length,
    /// Caller cancelled the call
    Cancelled,
    /// The call failed
    Error,
    /// The model requested a tool invocation
    ToolCall,
}

impl FinishReason {
    /// Map a backend's finish label onto the closed set
    pub fn from_backend(label: &str) -> Self {
        match label {
            "length" | "max_tokens" | "MAX_TOKENS" | "model_length" => Self::Length,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolCall,
            _ => Self::Stop,
        }
    }
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Outcome of one generation call
///
/// Built only through the constructors below: an error leaves the content
/// empty, and a tool call always finishes with [`FinishReason::ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    content: String,
    finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_request: Option<ToolCallRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GenerationResult {
    /// Plain text reply
    pub fn text(content: impl Into<String>, finish_reason: FinishReason) -> Self {
        let finish_reason = match finish_reason {
            FinishReason::ToolCall => FinishReason::Stop,
            other => other,
        };
        Self {
            content: content.into(),
            finish_reason,
            usage: None,
            tool_call_request: None,
            error: None,
        }
    }

    /// Tool invocation; carries no text content
    pub fn tool_call(request: ToolCallRequest) -> Self {
        Self {
            content: String::new(),
            finish_reason: FinishReason::ToolCall,
            usage: None,
            tool_call_request: Some(request),
            error: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            content: String::new(),
            finish_reason: FinishReason::Cancelled,
            usage: None,
            tool_call_request: None,
            error: None,
        }
    }

    /// Fold an error into a result
    pub fn failed(error: &LlmError) -> Self {
        if matches!(error, LlmError::Cancelled) {
            return Self::cancelled();
        }
        Self {
            content: String::new(),
            finish_reason: FinishReason::Error,
            usage: None,
            tool_call_request: None,
            error: Some(error.to_string()),
        }
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub const fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    pub const fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub const fn tool_call_request(&self) -> Option<&ToolCallRequest> {
        self.tool_call_request.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A model advertised by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            owned_by: None,
        }
    }
}

/// Outcome of a reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
