use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tools offered to the model, keyed by name in declaration order
pub type ToolSet = IndexMap<String, ToolDefinition>;

/// Definition of a tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments object
    #[serde(default = "empty_schema", alias = "parameters")]
    pub parameter_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameter_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
        }
    }
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Collect definitions into a [`ToolSet`]; a repeated name replaces the earlier entry
pub fn tool_set(definitions: impl IntoIterator<Item = ToolDefinition>) -> ToolSet {
    definitions.into_iter().map(|def| (def.name.clone(), def)).collect()
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Backend-assigned call id, generated when the backend supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}
