use serde_json::Value;

use super::{CallTarget, GenerateParams, WireApi, WireProtocol, bearer, body_with_extras, decode, join, none_if_empty, parse_frame};
use crate::error::LlmError;
use crate::extract::{NativeArguments, NativeCall, RawReply};
use crate::format::FormattedPrompt;
use crate::protocol::openai::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelList, OpenAiFunction,
    OpenAiTool, OpenAiUsage,
};
use crate::stream::{Frame, Framing};
use crate::transport::TransportRequest;
use crate::types::{FinishReason, ModelInfo, Role, ToolSet, Usage};

#[derive(Debug)]
pub(super) struct OpenAiChat;

#[derive(Debug)]
pub(super) struct OpenAiCompletions;

impl WireProtocol for OpenAiChat {
    fn api(&self) -> WireApi {
        WireApi::OpenaiChat
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let body = ChatRequest {
            model: target.model.to_owned(),
            messages: chat_messages(params.prompt),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: none_if_empty(params.prompt.stop()),
            stream: params.stream,
            tools: params.tools.filter(|tools| !tools.is_empty()).map(openai_tools),
        };

        Ok(
            TransportRequest::post(join(target.endpoint, "chat/completions")?, body_with_extras(&body, target.extra_options)?)
                .with_headers(bearer(target.api_key)?),
        )
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: ChatResponse = decode(body)?;
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::Parse("reply contained no choices".into()));
        };

        let native_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| NativeCall {
                id: call.id,
                name: call.function.name,
                arguments: NativeArguments::Encoded(call.function.arguments),
            })
            .collect();

        Ok(RawReply {
            text: choice.message.content.unwrap_or_default(),
            native_calls,
            finish: choice.finish_reason.as_deref().map(FinishReason::from_backend),
            usage: response.usage.map(usage),
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        if data.trim() == "[DONE]" {
            return Ok(Frame::Done);
        }

        let chunk: ChatChunk = decode(parse_frame(data)?)?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map_or(Frame::Skip, Frame::Text))
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        build_models(target)
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        decode_models(body)
    }
}

impl WireProtocol for OpenAiCompletions {
    fn api(&self) -> WireApi {
        WireApi::OpenaiCompletions
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let FormattedPrompt::Text { ref text, ref stop } = *params.prompt else {
            return Err(LlmError::Configuration(
                "the completions endpoint needs a text template, not structured messages".into(),
            ));
        };

        let body = CompletionRequest {
            model: target.model.to_owned(),
            prompt: text.clone(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: none_if_empty(stop),
            stream: params.stream,
        };

        Ok(
            TransportRequest::post(join(target.endpoint, "completions")?, body_with_extras(&body, target.extra_options)?)
                .with_headers(bearer(target.api_key)?),
        )
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: CompletionResponse = decode(body)?;
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::Parse("reply contained no choices".into()));
        };

        Ok(RawReply {
            text: choice.text,
            native_calls: Vec::new(),
            finish: choice.finish_reason.as_deref().map(FinishReason::from_backend),
            usage: response.usage.map(usage),
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        if data.trim() == "[DONE]" {
            return Ok(Frame::Done);
        }

        let chunk: CompletionResponse = decode(parse_frame(data)?)?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .filter(|text| !text.is_empty())
            .map_or(Frame::Skip, Frame::Text))
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        build_models(target)
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        decode_models(body)
    }
}

fn build_models(target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
    Ok(TransportRequest::get(join(target.endpoint, "models")?).with_headers(bearer(target.api_key)?))
}

fn decode_models(body: Value) -> Result<Vec<ModelInfo>, LlmError> {
    let list: ModelList = decode(body)?;
    Ok(list
        .data
        .into_iter()
        .map(|model| ModelInfo {
            id: model.id,
            name: None,
            owned_by: model.owned_by,
        })
        .collect())
}

fn chat_messages(prompt: &FormattedPrompt) -> Vec<ChatMessage> {
    match prompt {
        FormattedPrompt::Messages { system, messages, .. } => system
            .iter()
            .map(|system| ChatMessage {
                role: Role::System.to_string(),
                content: system.clone(),
                tool_call_id: None,
            })
            .chain(messages.iter().map(|message| ChatMessage {
                role: message.role.to_string(),
                content: message.content.clone(),
                tool_call_id: message.tool_call_id.clone(),
            }))
            .collect(),
        FormattedPrompt::Text { text, .. } => vec![ChatMessage {
            role: Role::User.to_string(),
            content: text.clone(),
            tool_call_id: None,
        }],
    }
}

pub(super) fn openai_tools(tools: &ToolSet) -> Vec<OpenAiTool> {
    tools
        .values()
        .map(|tool| OpenAiTool {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                parameters: tool.parameter_schema.clone(),
            },
        })
        .collect()
}

fn usage(usage: OpenAiUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage
            .total_tokens
            .max(usage.prompt_tokens.saturating_add(usage.completion_tokens)),
    }
}
