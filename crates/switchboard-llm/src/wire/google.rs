use secrecy::ExposeSecret;
use serde_json::Value;
use url::Url;

use super::{CallTarget, GenerateParams, WireApi, WireProtocol, decode, join, merge_missing, none_if_empty, parse_frame};
use crate::error::LlmError;
use crate::extract::{NativeArguments, NativeCall, RawReply};
use crate::format::FormattedPrompt;
use crate::protocol::google::{
    GenerateContentRequest, GenerateContentResponse, GoogleContent, GoogleFunctionDeclaration, GoogleGenerationConfig,
    GoogleModelList, GooglePart, GoogleTool,
};
use crate::stream::{Frame, Framing};
use crate::transport::TransportRequest;
use crate::types::{FinishReason, ModelInfo, Role, Usage};

#[derive(Debug)]
pub(super) struct Google;

/// Model ids may be given with or without the `models/` prefix
fn model_path(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

fn with_key(mut url: Url, target: &CallTarget<'_>) -> Url {
    if let Some(key) = target.api_key.filter(|key| !key.expose_secret().is_empty()) {
        url.query_pairs_mut().append_pair("key", key.expose_secret());
    }
    url
}

fn contents(prompt: &FormattedPrompt) -> (Option<GoogleContent>, Vec<GoogleContent>) {
    match prompt {
        FormattedPrompt::Messages { system, messages, .. } => {
            let mut system_parts: Vec<GooglePart> = system.iter().map(GooglePart::text).collect();
            let mut turns = Vec::with_capacity(messages.len());

            for message in messages {
                let role = match message.role {
                    Role::System => {
                        system_parts.push(GooglePart::text(message.content.as_str()));
                        continue;
                    }
                    Role::Assistant | Role::Tool => "model",
                    Role::User => "user",
                };
                turns.push(GoogleContent {
                    role: Some(role.to_owned()),
                    parts: vec![GooglePart::text(message.content.as_str())],
                });
            }

            let system = (!system_parts.is_empty()).then_some(GoogleContent {
                role: None,
                parts: system_parts,
            });
            (system, turns)
        }
        FormattedPrompt::Text { text, .. } => (
            None,
            vec![GoogleContent {
                role: Some("user".to_owned()),
                parts: vec![GooglePart::text(text.as_str())],
            }],
        ),
    }
}

impl WireProtocol for Google {
    fn api(&self) -> WireApi {
        WireApi::Google
    }

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn build_generate(
        &self,
        target: &CallTarget<'_>,
        params: &GenerateParams<'_>,
    ) -> Result<TransportRequest, LlmError> {
        let (system_instruction, contents) = contents(params.prompt);

        let body = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GoogleGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                stop_sequences: none_if_empty(params.prompt.stop()),
            },
            tools: params.tools.filter(|tools| !tools.is_empty()).map(|tools| {
                vec![GoogleTool {
                    function_declarations: tools
                        .values()
                        .map(|tool| GoogleFunctionDeclaration {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameter_schema.clone(),
                        })
                        .collect(),
                }]
            }),
        };

        // extra options are sampling parameters, so they go into generationConfig
        let mut value = serde_json::to_value(&body)?;
        if let Some(Value::Object(config)) = value.get_mut("generationConfig") {
            merge_missing(config, target.extra_options);
        }

        let model = model_path(target.model);
        let url = if params.stream {
            let mut url = join(target.endpoint, &format!("models/{model}:streamGenerateContent"))?;
            url.query_pairs_mut().append_pair("alt", "sse");
            url
        } else {
            join(target.endpoint, &format!("models/{model}:generateContent"))?
        };

        Ok(TransportRequest::post(with_key(url, target), value))
    }

    fn decode_reply(&self, body: Value) -> Result<RawReply, LlmError> {
        let response: GenerateContentResponse = decode(body)?;
        let usage = response
            .usage_metadata
            .map(|usage| Usage::new(usage.prompt_token_count, usage.candidates_token_count));

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(LlmError::Parse("reply contained no candidates".into()));
        };

        let mut text = String::new();
        let mut native_calls = Vec::new();
        for part in candidate.content.parts {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            }
            if let Some(call) = part.function_call {
                native_calls.push(NativeCall {
                    id: None,
                    name: call.name,
                    arguments: NativeArguments::Structured(call.args),
                });
            }
        }

        let finish = if native_calls.is_empty() {
            candidate.finish_reason.as_deref().map(FinishReason::from_backend)
        } else {
            Some(FinishReason::ToolCall)
        };

        Ok(RawReply {
            text,
            native_calls,
            finish,
            usage,
        })
    }

    fn decode_frame(&self, data: &str) -> Result<Frame, LlmError> {
        let chunk: GenerateContentResponse = decode(parse_frame(data)?)?;
        let text: String = chunk
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        Ok(if text.is_empty() { Frame::Skip } else { Frame::Text(text) })
    }

    fn build_models(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        Ok(TransportRequest::get(with_key(join(target.endpoint, "models")?, target)))
    }

    fn decode_models(&self, body: Value) -> Result<Vec<ModelInfo>, LlmError> {
        let list: GoogleModelList = decode(body)?;
        Ok(list
            .models
            .into_iter()
            .map(|model| ModelInfo {
                id: model_path(&model.name).to_owned(),
                name: model.display_name,
                owned_by: Some("google".to_owned()),
            })
            .collect())
    }

    /// Model metadata lookup, which also proves the model id exists
    fn build_probe(&self, target: &CallTarget<'_>) -> Result<TransportRequest, LlmError> {
        let url = join(target.endpoint, &format!("models/{}", model_path(target.model)))?;
        Ok(TransportRequest::get(with_key(url, target)))
    }
}
