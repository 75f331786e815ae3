use http::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::Value;

use super::{
    CallTarget, GenerateParams, WireApi, WireProtocol, body_with_extras, decode, join, named_header, none_if_empty,
    secret_header,
};
use crate::error::LlmError;
use crate::extract::{NativeArguments, NativeCall, RawReply};
use crate::format::FormattedPrompt;
use crate::protocol::anthropic::{
    API_VERSION, AnthropicBlock, AnthropicMessage, AnthropicModelList, AnthropicStreamDelta, AnthropicStreamEvent,
    AnthropicTool, DEFAULT_MAX_TOKENS, MessagesRequest, MessagesResponse,
};
use crate::stream::{Frame, Framing};
use crate::transport::TransportRequest;
use crate::types::{FinishReason, ModelInfo, Role, Usage};

#[derive(Debug)]
pub(super) struct Anthropic;

fn headers(target: &CallTarget<'_>) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = target.api_key {
        named_header(&mut headers, "x-api-key", secret_header(key.expose_secret())?);
    }
    named_header(
        &mut headers,
        "anthropic-version",
        http::HeaderValue::from_static(API_VERSION),
    );
    Ok(headers)
}

/// Split a prompt into the top-level system text and user/assistant turns
fn conversation(prompt: &FormattedPrompt) -> (Option<String>, Vec<AnthropicMessage>) {
    match prompt {
        FormattedPrompt::Messages { system, messages, .. } => {
            let mut system_parts: Vec<String> = system.iter().cloned().collect();
            let mut turns = Vec::with_capacity(messages.len());

            for message in messages {
                let role = match message.role {
                    Role::System => {
                        system_parts.push(message.content.clone());
                        continue;
                    }
                    Role::Assistant => "assistant",
                    Role::User | Role::Tool => "user",
                };
                turns.push(AnthropicMessage {
                    role: role.to_owned(),
                    content: message.content.clone(),
                });
            }

            let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
            (system, turns)
        }
        FormattedPrompt::Text { text, .. } => (
            None,
            vec![AnthropicMessage {
                role: "user".to_owned(),
                content: text.clone(),
            }],
        ),
    }
}

impl WireProtocol for Anthropic {
    fn api(&self) -> WireApi {
        WireApi::Anthropic
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let (system, messages) = conversation(params.prompt);

        let body = MessagesRequest {
            model: target.model.to_owned(),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: params.temperature,
            stop_sequences: none_if_empty(params.prompt.stop()),
            stream: params.stream,
            tools: params.tools.filter(|tools| !tools.is_empty()).map(|tools| {
                tools
                    .values()
                    .map(|tool| AnthropicTool {
                        name: tool.name.clone(),
                        description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                        input_schema: tool.parameter_schema.clone(),
                    })
                    .collect()
            }),
        };

        Ok(
            TransportRequest::post(join(target.endpoint, "messages")?, body_with_extras(&body, target.extra_options)?)
                .with_headers(headers(target)?),
        )
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: MessagesResponse = decode(body)?;

        let mut text = String::new();
        let mut native_calls = Vec::new();
        for block in response.content {
            match block {
                AnthropicBlock::Text { text: part } => text.push_str(&part),
                AnthropicBlock::ToolUse { id, name, input } => native_calls.push(NativeCall {
                    id: Some(id),
                    name,
                    arguments: NativeArguments::Structured(input),
                }),
                AnthropicBlock::Other => {}
            }
        }

        Ok(RawReply {
            text,
            native_calls,
            finish: response.stop_reason.as_deref().map(FinishReason::from_backend),
            usage: response
                .usage
                .map(|usage| Usage::new(usage.input_tokens, usage.output_tokens)),
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        let event: AnthropicStreamEvent =
            serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("malformed stream frame: {e}")))?;

        match event {
            AnthropicStreamEvent::ContentBlockDelta {
                delta: AnthropicStreamDelta::TextDelta { text },
            } if !text.is_empty() => Ok(Frame::Text(text)),
            AnthropicStreamEvent::MessageStop => Ok(Frame::Done),
            AnthropicStreamEvent::Error { error } => Err(LlmError::remote(None, error.message)),
            _ => Ok(Frame::Skip),
        }
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        Ok(TransportRequest::get(join(target.endpoint, "models")?).with_headers(headers(target)?))
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        let list: AnthropicModelList = decode(body)?;
        Ok(list
            .data
            .into_iter()
            .map(|model| ModelInfo {
                id: model.id,
                name: model.display_name,
                owned_by: Some("anthropic".to_owned()),
            })
            .collect())
    }
}
