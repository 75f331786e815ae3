use serde_json::{Map, Value, json};

use super::openai::openai_tools;
use super::{CallTarget, GenerateParams, WireApi, WireProtocol, bearer, decode, join, merge_missing, parse_frame};
use crate::error::LlmError;
use crate::extract::{NativeArguments, NativeCall, RawReply};
use crate::format::FormattedPrompt;
use crate::protocol::ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaGenerateResponse, OllamaMessage, OllamaTags,
};
use crate::stream::{Frame, Framing};
use crate::transport::TransportRequest;
use crate::types::{FinishReason, ModelInfo, Role, Usage};

#[derive(Debug)]
pub(super) struct OllamaChat;

#[derive(Debug)]
pub(super) struct OllamaGenerate;

/// Sampling parameters live in `options`; extra options join them there
fn options(params: &GenerateParams<'_>, extras: &Map<String, Value>) -> Map<String, Value> {
    let mut options = Map::new();
    if let Some(temperature) = params.temperature {
        options.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = params.max_tokens {
        options.insert("num_predict".into(), json!(max_tokens));
    }
    if !params.prompt.stop().is_empty() {
        options.insert("stop".into(), json!(params.prompt.stop()));
    }
    merge_missing(&mut options, extras);
    options
}

fn usage(prompt: Option<u32>, completion: Option<u32>) -> Option<Usage> {
    (prompt.is_some() || completion.is_some()).then(|| Usage::new(prompt.unwrap_or(0), completion.unwrap_or(0)))
}

fn build_tags(target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
    Ok(TransportRequest::get(join(target.endpoint, "api/tags")?).with_headers(bearer(target.api_key)?))
}

fn decode_tags(body: Value) -> Result<Vec<ModelInfo>, LlmError> {
    let tags: OllamaTags = decode(body)?;
    Ok(tags
        .models
        .into_iter()
        .map(|model| ModelInfo {
            id: model.name,
            name: model.model,
            owned_by: None,
        })
        .collect())
}

impl WireProtocol for OllamaChat {
    fn api(&self) -> WireApi {
        WireApi::OllamaChat
    }

    fn framing(&self) -> Framing {
        Framing::Ndjson
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let messages = match params.prompt {
            FormattedPrompt::Messages { system, messages, .. } => system
                .iter()
                .map(|system| (Role::System, system.as_str()))
                .chain(messages.iter().map(|m| (m.role, m.content.as_str())))
                .map(|(role, content)| OllamaMessage {
                    role: role.to_string(),
                    content: content.to_owned(),
                    tool_calls: Vec::new(),
                })
                .collect(),
            FormattedPrompt::Text { text, .. } => vec![OllamaMessage {
                role: Role::User.to_string(),
                content: text.clone(),
                tool_calls: Vec::new(),
            }],
        };

        let body = OllamaChatRequest {
            model: target.model.to_owned(),
            messages,
            stream: params.stream,
            options: options(params, target.extra_options),
            tools: params.tools.filter(|tools| !tools.is_empty()).map(openai_tools),
        };

        Ok(TransportRequest::post(join(target.endpoint, "api/chat")?, serde_json::to_value(&body)?)
            .with_headers(bearer(target.api_key)?))
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: OllamaChatResponse = decode(body)?;
        if let Some(error) = response.error {
            return Err(LlmError::remote(None, error));
        }

        let message = response.message.unwrap_or(OllamaMessage {
            role: Role::Assistant.to_string(),
            content: String::new(),
            tool_calls: Vec::new(),
        });

        let native_calls: Vec<_> = message
            .tool_calls
            .into_iter()
            .map(|call| NativeCall {
                id: None,
                name: call.function.name,
                arguments: NativeArguments::Structured(call.function.arguments),
            })
            .collect();

        let finish = if native_calls.is_empty() {
            response.done_reason.as_deref().map(FinishReason::from_backend)
        } else {
            Some(FinishReason::ToolCall)
        };

        Ok(RawReply {
            text: message.content,
            native_calls,
            finish,
            usage: usage(response.prompt_eval_count, response.eval_count),
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        let line: OllamaChatResponse = decode(parse_frame(data)?)?;
        let text = line.message.map(|message| message.content).unwrap_or_default();

        Ok(match (text.is_empty(), line.done) {
            (false, _) => Frame::Text(text),
            (true, true) => Frame::Done,
            (true, false) => Frame::Skip,
        })
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        build_tags(target)
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        decode_tags(body)
    }
}

impl WireProtocol for OllamaGenerate {
    fn api(&self) -> WireApi {
        WireApi::OllamaGenerate
    }

    fn framing(&self) -> Framing {
        Framing::Ndjson
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let FormattedPrompt::Text { ref text, .. } = *params.prompt else {
            return Err(LlmError::Configuration(
                "raw generation needs a text template, not structured messages".into(),
            ));
        };

        let body = OllamaGenerateRequest {
            model: target.model.to_owned(),
            prompt: text.clone(),
            raw: true,
            stream: params.stream,
            options: options(params, target.extra_options),
        };

        Ok(
            TransportRequest::post(join(target.endpoint, "api/generate")?, serde_json::to_value(&body)?)
                .with_headers(bearer(target.api_key)?),
        )
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: OllamaGenerateResponse = decode(body)?;
        if let Some(error) = response.error {
            return Err(LlmError::remote(None, error));
        }

        Ok(RawReply {
            text: response.response,
            native_calls: Vec::new(),
            finish: response.done_reason.as_deref().map(FinishReason::from_backend),
            usage: usage(response.prompt_eval_count, response.eval_count),
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        let line: OllamaGenerateResponse = decode(parse_frame(data)?)?;

        Ok(match (line.response.is_empty(), line.done) {
            (false, _) => Frame::Text(line.response),
            (true, true) => Frame::Done,
            (true, false) => Frame::Skip,
        })
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        build_tags(target)
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        decode_tags(body)
    }
}
