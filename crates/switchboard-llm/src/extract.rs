//! Raw reply to content or tool call

use serde_json::{Map, Value};

use crate::types::{FinishReason, ToolCallRequest, ToolSet, Usage};

/// How an adapter obtains tool invocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToolStrategy {
    /// Backend returns structured function calls
    #[default]
    Native,
    /// Model answers with a JSON object describing the call
    Emulated,
}

impl From<switchboard_config::ToolMode> for ToolStrategy {
    fn from(mode: switchboard_config::ToolMode) -> Self {
        match mode {
            switchboard_config::ToolMode::Native => Self::Native,
            switchboard_config::ToolMode::Emulated => Self::Emulated,
        }
    }
}

/// Arguments as the backend delivered them
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArguments {
    /// JSON text, as in `OpenAI` `function.arguments`
    Encoded(String),
    /// Already-decoded value, as in Anthropic `input` or Google `args`
    Structured(Value),
}

/// A function call reported in a backend's structured call field
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: NativeArguments,
}

/// Decoded backend reply before extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReply {
    pub text: String,
    pub native_calls: Vec<NativeCall>,
    pub finish: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl RawReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Outcome of extraction: content and a tool call are mutually exclusive
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Content(String),
    ToolCall(ToolCallRequest),
}

/// Turns a raw reply into plain content or one tool call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolCallExtractor {
    strategy: ToolStrategy,
}

impl ToolCallExtractor {
    pub const fn new(strategy: ToolStrategy) -> Self {
        Self { strategy }
    }

    pub const fn strategy(&self) -> ToolStrategy {
        self.strategy
    }

    /// Extract the first tool call, or fall back to the reply text
    ///
    /// A native call always wins. Emulated parsing only runs when tools were
    /// offered. Nothing here fails: unusable arguments become an empty map and
    /// unparseable text is returned unchanged.
    pub fn extract(&self, reply: &RawReply, tools: &ToolSet) -> Extraction {
        if let Some((first, rest)) = reply.native_calls.split_first() {
            if !rest.is_empty() {
                tracing::debug!(
                    kept = %first.name,
                    dropped = rest.len(),
                    "backend returned several tool calls, keeping the first"
                );
            }
            return Extraction::ToolCall(native_call(first));
        }

        if self.strategy == ToolStrategy::Emulated && !tools.is_empty() {
            return emulated(&reply.text);
        }

        Extraction::Content(reply.text.clone())
    }
}

fn native_call(call: &NativeCall) -> ToolCallRequest {
    let arguments = match call.arguments {
        NativeArguments::Encoded(ref text) => decode_arguments(&call.name, text),
        NativeArguments::Structured(ref value) => object_or_empty(&call.name, value.clone()),
    };

    ToolCallRequest {
        name: call.name.clone(),
        arguments,
        id: call.id.clone().or_else(|| Some(generate_call_id())),
    }
}

fn emulated(raw: &str) -> Extraction {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(strip_code_fence(raw.trim())) else {
        return Extraction::Content(raw.to_owned());
    };

    if let Some(Value::Object(call)) = object.remove("tool_call") {
        let Some(name) = call.get("name").and_then(Value::as_str).filter(|name| !name.is_empty()) else {
            return Extraction::Content(raw.to_owned());
        };

        let arguments = match call.get("arguments") {
            Some(Value::String(text)) => decode_arguments(name, text),
            Some(value) => object_or_empty(name, value.clone()),
            None => Map::new(),
        };

        return Extraction::ToolCall(ToolCallRequest {
            name: name.to_owned(),
            arguments,
            id: Some(
                call.get("id")
                    .and_then(Value::as_str)
                    .map_or_else(generate_call_id, str::to_owned),
            ),
        });
    }

    match object.remove("final_answer") {
        Some(Value::String(answer)) => Extraction::Content(answer),
        Some(other @ (Value::Number(_) | Value::Bool(_) | Value::Array(_) | Value::Object(_))) => {
            Extraction::Content(other.to_string())
        }
        _ => Extraction::Content(raw.to_owned()),
    }
}

/// Remove one surrounding Markdown code fence, if present
fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = body.strip_suffix("```") else {
        return text;
    };

    // drop the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((info, rest)) if !info.trim().contains(char::is_whitespace) => rest.trim(),
        _ => body.trim(),
    }
}

fn decode_arguments(tool: &str, text: &str) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => object_or_empty(tool, value),
        Err(e) => {
            tracing::warn!(tool = %tool, error = %e, "tool call arguments are not valid JSON, using empty arguments");
            Map::new()
        }
    }
}

fn object_or_empty(tool: &str, value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::warn!(tool = %tool, arguments = %other, "tool call arguments are not an object, using empty arguments");
            Map::new()
        }
    }
}

fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// System instructions asking the model to answer with one JSON object
pub fn emulation_instructions(tools: &ToolSet) -> String {
    let mut out = String::from(
        "You can call the following tools. Reply with exactly one JSON object and nothing else.\n\
         To call a tool: {\"tool_call\": {\"name\": \"<tool name>\", \"arguments\": { ... }}}\n\
         To answer directly: {\"final_answer\": \"<your answer>\"}\n\nTools:\n",
    );

    for tool in tools.values() {
        out.push_str("- ");
        out.push_str(&tool.name);
        if !tool.description.is_empty() {
            out.push_str(": ");
            out.push_str(&tool.description);
        }
        out.push_str("\n  parameters: ");
        out.push_str(&tool.parameter_schema.to_string());
        out.push('\n');
    }

    out
}
