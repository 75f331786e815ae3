//! Per-family request building and reply decoding
//!
//! Each [`WireProtocol`] is pure: it turns a formatted prompt into a
//! [`TransportRequest`] and decodes bodies and stream frames, never touching
//! the network itself.

mod anthropic;
mod google;
mod ollama;
mod openai;

use std::fmt::Debug;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::error::LlmError;
use crate::extract::RawReply;
use crate::format::FormattedPrompt;
use crate::stream::{Frame, Framing};
use crate::transport::TransportRequest;
use crate::types::{ModelInfo, ToolSet};

/// API family spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WireApi {
    /// `OpenAI` `/chat/completions`
    OpenaiChat,
    /// `OpenAI` legacy `/completions` with a raw prompt
    OpenaiCompletions,
    /// Anthropic `/messages`
    Anthropic,
    /// Google `generateContent`
    Google,
    /// Ollama `/api/chat`
    OllamaChat,
    /// Ollama `/api/generate` in raw mode
    OllamaGenerate,
}

impl WireApi {
    pub fn protocol(self) -> Arc<dyn WireProtocol> {
        match self {
            Self::OpenaiChat => Arc::new(openai::OpenAiChat),
            Self::OpenaiCompletions => Arc::new(openai::OpenAiCompletions),
            Self::Anthropic => Arc::new(anthropic::Anthropic),
            Self::Google => Arc::new(google::Google),
            Self::OllamaChat => Arc::new(ollama::OllamaChat),
            Self::OllamaGenerate => Arc::new(ollama::OllamaGenerate),
        }
    }

    /// Whether the endpoint takes one pre-templated prompt string
    pub const fn takes_raw_prompt(self) -> bool {
        matches!(self, Self::OpenaiCompletions | Self::OllamaGenerate)
    }

    /// Whether the endpoint can return structured function calls
    pub const fn supports_native_tools(self) -> bool {
        !self.takes_raw_prompt()
    }
}

/// Where and as whom a call is made
#[derive(Debug, Clone, Copy)]
pub struct CallTarget<'a> {
    pub endpoint: &'a Url,
    pub api_key: Option<&'a SecretString>,
    pub model: &'a str,
    /// Backend-specific body fields that never override core fields
    pub extra_options: &'a Map<String, Value>,
}

/// Generation inputs after formatting
#[derive(Debug, Clone, Copy)]
pub struct GenerateParams<'a> {
    pub prompt: &'a FormattedPrompt,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Tools to declare natively; `None` when tools are emulated or absent
    pub tools: Option<&'a ToolSet>,
    pub stream: bool,
}

/// Request building and decoding for one API family
pub trait WireProtocol: Send + Sync + Debug {
    fn api(&self) -> WireApi;

    fn framing(&self) -> Framing;

    fn build_generate(&self, target: &CallTarget<'_>, params: &GenerateParams<'_>)
    -> Result<TransportRequest, LlmError>;

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError>;

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError>;

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError>;

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError>;

    /// Cheapest request proving reachability and credentials
    fn build_probe(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        self.build_models(target)
    }
}

/// Append `path` to the endpoint, keeping any base path
fn join(endpoint: &Url, path: &str) -> Result<Url, LlmError> {
    let base = endpoint.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))
        .map_err(|e| LlmError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))
}

fn secret_header(value: &str) -> Result<HeaderValue, LlmError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| LlmError::Configuration("API key is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// `Authorization: Bearer` when a key is present
fn bearer(api_key: Option<&SecretString>) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|key| !key.expose_secret().is_empty()) {
        headers.insert(
            header::AUTHORIZATION,
            secret_header(&format!("Bearer {}", key.expose_secret()))?,
        );
    }
    Ok(headers)
}

fn named_header(headers: &mut HeaderMap, name: &'static str, value: HeaderValue) {
    headers.insert(HeaderName::from_static(name), value);
}

/// Serialize a wire body and add extra options without overriding set fields
fn body_with_extras<T: serde::Serialize>(body: &T, extras: &Map<String, Value>) -> Result<Value, LlmError> {
    let mut value = serde_json::to_value(body)?;
    if let Value::Object(ref mut object) = value {
        merge_missing(object, extras);
    }
    Ok(value)
}

fn merge_missing(target: &mut Map<String, Value>, extras: &Map<String, Value>) {
    for (key, value) in extras {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, LlmError> {
    serde_json::from_value(body).map_err(|e| LlmError::Parse(format!("unexpected reply body: {e}")))
}

/// Error object embedded in a successful-status body or stream frame
fn embedded_error(value: &Value) -> Option<LlmError> {
    let message = match value.get("error")? {
        Value::Object(error) => error.get("message").and_then(Value::as_str).unwrap_or("unknown error"),
        Value::String(error) => error.as_str(),
        _ => return None,
    };
    Some(LlmError::remote(None, message))
}

fn parse_frame(data: &str) -> Result<Value, LlmError> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("malformed stream frame: {e}")))?;
    match embedded_error(&value) {
        Some(error) => Err(error),
        None => Ok(value),
    }
}

fn none_if_empty(stop: &[String]) -> Option<Vec<String>> {
    (!stop.is_empty()).then(|| stop.to_vec())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn target<'a>(endpoint: &'a Url, key: Option<&'a SecretString>, extras: &'a Map<String, Value>) -> CallTarget<'a> {
        CallTarget {
            endpoint,
            api_key: key,
            model: "test-model",
            extra_options: extras,
        }
    }

    #[test]
    fn join_keeps_base_path() {
        let base = Url::parse("https://api.groq.com/openai/v1/").unwrap();
        assert_eq!(
            join(&base, "chat/completions").unwrap().as_str(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn extras_never_override() {
        let mut body = serde_json::json!({ "model": "a", "stream": false })
            .as_object()
            .cloned()
            .unwrap();
        let extras = serde_json::json!({ "model": "b", "top_p": 0.9 })
            .as_object()
            .cloned()
            .unwrap();
        merge_missing(&mut body, &extras);
        assert_eq!(body["model"], "a");
        assert_eq!(body["top_p"], 0.9);
    }

    #[test]
    fn bearer_is_sensitive_and_optional() {
        assert!(bearer(None).unwrap().is_empty());
        let key = SecretString::from("sk-1");
        let headers = bearer(Some(&key)).unwrap();
        let value = &headers[header::AUTHORIZATION];
        assert!(value.is_sensitive());
        assert_eq!(value, "Bearer sk-1");
    }

    #[test]
    fn embedded_errors() {
        let err = embedded_error(&serde_json::json!({ "error": { "message": "quota" } })).unwrap();
        assert_eq!(err, LlmError::remote(None, "quota"));
        assert!(embedded_error(&serde_json::json!({ "choices": [] })).is_none());
    }

    #[test]
    fn raw_prompt_apis() {
        assert!(WireApi::OllamaGenerate.takes_raw_prompt());
        assert!(!WireApi::Anthropic.takes_raw_prompt());
        assert_eq!(WireApi::OpenaiChat.protocol().api(), WireApi::OpenaiChat);
    }
}
