//! Anthropic Messages API wire format types

use serde::{Deserialize, Serialize};

/// Required `anthropic-version` header value
pub const API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for this API
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Request types --

/// `POST /messages` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
}

/// Conversation turn ("user" or "assistant")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

// -- Response types --

/// `POST /messages` reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<AnthropicBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block in a reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Arguments, already structured
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Thinking and other block types
    #[serde(other)]
    Other,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming types --

/// SSE event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    ContentBlockDelta {
        delta: AnthropicStreamDelta,
    },
    MessageStop,
    /// Error reported mid-stream
    Error {
        error: AnthropicErrorDetail,
    },
    /// `message_start`, `ping`, block boundaries
    #[serde(other)]
    Other,
}

/// Delta in a `content_block_delta` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    TextDelta {
        text: String,
    },
    /// Tool input and thinking deltas
    #[serde(other)]
    Other,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: String,
    pub message: String,
}

// -- Model listing --

/// `GET /models` reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicModelList {
    #[serde(default)]
    pub data: Vec<AnthropicModel>,
}

/// Entry in a model list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicModel {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}
