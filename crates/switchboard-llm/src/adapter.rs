//! The uniform provider contract and its single implementation

use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, TryStreamExt, future, stream};
use secrecy::ExposeSecret;
use switchboard_config::{ProviderConfig, ProviderKind, ProviderSettings, RetryConfig};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cancel::CancellationBridge;
use crate::catalog::Preset;
use crate::error::LlmError;
use crate::extract::{Extraction, RawReply, ToolCallExtractor, ToolStrategy, emulation_instructions};
use crate::format::{PromptFamily, PromptFormatter};
use crate::phase::{CallPhase, CallTracker};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::stream::{Frame, frames};
use crate::transport::{Transport, TransportRequest};
use crate::types::{ConnectionStatus, FinishReason, GenerationRequest, GenerationResult, ModelInfo, ToolSet};
use crate::wire::{CallTarget, GenerateParams, WireProtocol};

/// Text fragments in backend emission order
///
/// Ends after the backend finishes, after the first error item, or as soon
/// as the caller cancels (without an error item).
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// One backend behind the uniform contract
///
/// Public operations never return `Err`; failures are folded into the
/// returned value.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id from configuration
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Whether calls can be attempted with the current settings
    fn is_configured(&self) -> bool;

    /// Generate a complete reply
    ///
    /// `tools` overrides the request's own tool definitions when given.
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
        tools: Option<&ToolSet>,
    ) -> GenerationResult;

    /// Stream a reply; nothing is sent until the stream is first polled
    fn stream_generate(&self, request: &GenerationRequest, cancel: Option<CancellationToken>) -> FragmentStream;

    /// Models offered by the backend, or a static fallback list
    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Cheapest request proving reachability and credentials
    async fn test_connection(&self, model_id: Option<&str>) -> ConnectionStatus;

    /// Replace the settings snapshot used by subsequent calls
    fn reload(&self, settings: ProviderSettings);
}

/// [`ProviderAdapter`] composed from a formatter, an extractor, a retry
/// executor, a wire protocol and a transport
pub struct Adapter {
    id: String,
    preset: Preset,
    settings: RwLock<Arc<ProviderSettings>>,
    formatter: PromptFormatter,
    extractor: ToolCallExtractor,
    retry: RetryExecutor,
    wire: Arc<dyn WireProtocol>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("id", &self.id)
            .field("kind", &self.preset.kind)
            .field("wire", &self.wire.api())
            .field("tools", &self.extractor.strategy())
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Adapter with the catalogue defaults for `kind`
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        settings: ProviderSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let preset = Preset::for_kind(kind);

        Self {
            id: id.into(),
            preset,
            settings: RwLock::new(Arc::new(settings)),
            formatter: PromptFormatter::new(
                PromptFamily::resolve(preset.template, None, preset.message_style)
                    .unwrap_or(PromptFamily::Messages(preset.message_style)),
            ),
            extractor: ToolCallExtractor::new(preset.tools),
            retry: RetryExecutor::default(),
            wire: preset.wire.protocol(),
            transport,
        }
    }

    /// Build from one provider's configuration
    ///
    /// `default_retry` applies when the provider has no retry override.
    pub fn from_config(
        id: impl Into<String>,
        config: &ProviderConfig,
        default_retry: &RetryConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, LlmError> {
        let mut adapter = Self::new(id, config.kind, config.settings(), transport);

        let template = config.template.unwrap_or(adapter.preset.template);
        let family = PromptFamily::resolve(template, config.custom_template.as_ref(), adapter.preset.message_style)?;
        adapter = adapter.with_family(family)?;

        if let Some(mode) = config.tool_strategy {
            adapter = adapter.with_tool_strategy(mode.into());
        }

        let retry = config.retry.as_ref().unwrap_or(default_retry);
        Ok(adapter.with_retry_policy(RetryPolicy::from_config(retry)?))
    }

    /// Use another prompt family, switching wire endpoint if needed
    pub fn with_family(mut self, family: PromptFamily) -> Result<Self, LlmError> {
        let wire = self.preset.wire_for(&family)?;
        self.wire = wire.protocol();
        self.formatter = PromptFormatter::new(family);
        let strategy = self.extractor.strategy();
        Ok(self.with_tool_strategy(strategy))
    }

    /// Raw-prompt endpoints cannot return structured calls, so they always emulate
    #[must_use]
    pub fn with_tool_strategy(mut self, strategy: ToolStrategy) -> Self {
        let strategy = if strategy == ToolStrategy::Native && !self.wire.api().supports_native_tools() {
            tracing::debug!(provider = %self.id, wire = %self.wire.api(), "native tools unavailable, emulating");
            ToolStrategy::Emulated
        } else {
            strategy
        };
        self.extractor = ToolCallExtractor::new(strategy);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub const fn preset(&self) -> &Preset {
        &self.preset
    }

    pub const fn formatter(&self) -> &PromptFormatter {
        &self.formatter
    }

    pub const fn tool_strategy(&self) -> ToolStrategy {
        self.extractor.strategy()
    }

    pub fn wire_api(&self) -> crate::wire::WireApi {
        self.wire.api()
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<ProviderSettings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn endpoint(&self, settings: &ProviderSettings) -> Url {
        settings
            .api_endpoint
            .clone()
            .unwrap_or_else(|| self.preset.default_endpoint())
    }

    fn check_configured(&self, settings: &ProviderSettings) -> Result<(), LlmError> {
        let has_key = settings
            .api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty());

        if self.preset.requires_key && !has_key {
            return Err(LlmError::Configuration(format!(
                "provider '{}' ({}) requires an API key",
                self.id, self.preset.kind
            )));
        }
        Ok(())
    }

    /// Requested model, else the configured default, else the first fallback
    fn resolve_model(&self, settings: &ProviderSettings, requested: &str) -> Result<String, LlmError> {
        let requested = requested.trim();
        if !requested.is_empty() {
            return Ok(requested.to_owned());
        }

        settings
            .default_model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .or_else(|| self.preset.fallback_models.first().copied())
            .map(str::to_owned)
            .ok_or_else(|| {
                LlmError::Configuration(format!(
                    "no model requested and provider '{}' has no default_model",
                    self.id
                ))
            })
    }

    /// Format the request and build the backend call
    fn prepare(&self, request: &GenerationRequest, tools: &ToolSet, stream: bool) -> Result<TransportRequest, LlmError> {
        let settings = self.settings();
        self.check_configured(&settings)?;
        let model = self.resolve_model(&settings, &request.model_id)?;

        let strategy = self.extractor.strategy();
        let preamble = (strategy == ToolStrategy::Emulated && !tools.is_empty()).then(|| emulation_instructions(tools));
        let prompt = self.formatter.format_with_preamble(request, preamble.as_deref());

        let endpoint = self.endpoint(&settings);
        let target = CallTarget {
            endpoint: &endpoint,
            api_key: settings.api_key.as_ref(),
            model: &model,
            extra_options: &settings.extra_options,
        };

        tracing::debug!(provider = %self.id, model = %model, stream, wire = %self.wire.api(), "prepared call");

        self.wire.build_generate(
            &target,
            &GenerateParams {
                prompt: &prompt,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                tools: (strategy == ToolStrategy::Native && !tools.is_empty()).then_some(tools),
                stream,
            },
        )
    }

    async fn run_generate(
        &self,
        request: &GenerationRequest,
        tools: &ToolSet,
        bridge: &CancellationBridge,
        tracker: &mut CallTracker,
    ) -> Result<GenerationResult, LlmError> {
        tracker.advance(CallPhase::Formatting);
        let call = self.prepare(request, tools, false).inspect_err(|_| {
            tracker.advance(CallPhase::Failed);
        })?;

        let body = self
            .retry
            .run(bridge, tracker, |_| self.transport.send(&call))
            .await?;

        let reply = self.wire.decode_reply(body).inspect_err(|_| {
            tracker.advance(CallPhase::Failed);
        })?;
        tracker.advance(CallPhase::Completed);

        Ok(self.finish(&reply, tools))
    }

    fn finish(&self, reply: &RawReply, tools: &ToolSet) -> GenerationResult {
        let usage = reply.usage;
        match self.extractor.extract(reply, tools) {
            Extraction::ToolCall(call) => {
                tracing::debug!(provider = %self.id, tool = %call.name, "model requested a tool call");
                GenerationResult::tool_call(call).with_usage(usage)
            }
            Extraction::Content(content) => {
                GenerationResult::text(content, reply.finish.unwrap_or(FinishReason::Stop)).with_usage(usage)
            }
        }
    }

    fn fallback_models(&self, settings: &ProviderSettings) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = settings
            .default_model
            .iter()
            .map(ModelInfo::new)
            .collect();

        for model in self.preset.fallback_models {
            if !models.iter().any(|known| known.id == *model) {
                models.push(ModelInfo::new(*model));
            }
        }
        models
    }

    async fn fetch_models(&self, settings: &ProviderSettings) -> Result<Vec<ModelInfo>, LlmError> {
        self.check_configured(settings)?;
        let endpoint = self.endpoint(settings);
        let model = self.resolve_model(settings, "").unwrap_or_default();
        let target = CallTarget {
            endpoint: &endpoint,
            api_key: settings.api_key.as_ref(),
            model: &model,
            extra_options: &settings.extra_options,
        };

        let body = self.transport.send(&self.wire.build_models(&target)?).await?;
        self.wire.decode_models(body)
    }
}

#[async_trait]
impl ProviderAdapter for Adapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        self.preset.kind
    }

    fn is_configured(&self) -> bool {
        self.check_configured(&self.settings()).is_ok()
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
        tools: Option<&ToolSet>,
    ) -> GenerationResult {
        let bridge = CancellationBridge::new(cancel);
        let mut tracker = CallTracker::new(self.id.as_str());

        if bridge.is_requested() {
            tracker.advance(CallPhase::Cancelled);
            tracing::debug!(provider = %self.id, "cancelled before sending");
            return GenerationResult::cancelled();
        }

        let tools = tools.unwrap_or(&request.tool_definitions);
        match self.run_generate(request, tools, &bridge, &mut tracker).await {
            Ok(result) => result,
            Err(LlmError::Cancelled) => {
                tracing::debug!(provider = %self.id, "generation cancelled");
                GenerationResult::cancelled()
            }
            Err(error) => {
                tracing::warn!(provider = %self.id, error = %error, "generation failed");
                GenerationResult::failed(&error)
            }
        }
    }

    fn stream_generate(&self, request: &GenerationRequest, cancel: Option<CancellationToken>) -> FragmentStream {
        let bridge = CancellationBridge::from_token(cancel);
        let mut tracker = CallTracker::new(self.id.as_str());
        tracker.advance(CallPhase::Formatting);

        let prepared = self.prepare(request, &ToolSet::new(), true);
        let transport = Arc::clone(&self.transport);
        let wire = Arc::clone(&self.wire);
        let retry = self.retry.clone();
        let provider = self.id.clone();
        let open_bridge = bridge.clone();

        let opened = stream::once(async move {
            let call = prepared.inspect_err(|_| {
                tracker.advance(CallPhase::Failed);
            })?;
            let bytes = retry
                .run(&open_bridge, &mut tracker, |_| transport.open_stream(&call))
                .await?;
            tracker.advance(CallPhase::Completed);

            let decoder = Arc::clone(&wire);
            Ok::<_, LlmError>(frames(bytes, wire.framing()).map(move |data| data.and_then(|data| decoder.decode_frame(&data))))
        })
        .try_flatten();

        let fragments = opened
            .scan(false, move |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                future::ready(match item {
                    Ok(Frame::Text(text)) => Some(Some(Ok(text))),
                    Ok(Frame::Skip) => Some(None),
                    Ok(Frame::Done) => None,
                    Err(LlmError::Cancelled) => None,
                    Err(error) => {
                        tracing::warn!(provider = %provider, error = %error, "stream failed");
                        *failed = true;
                        Some(Some(Err(error)))
                    }
                })
            })
            .filter_map(future::ready);

        Box::pin(bridge.guard_stream(Box::pin(fragments)))
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let settings = self.settings();
        match self.fetch_models(&settings).await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => self.fallback_models(&settings),
            Err(error) => {
                tracing::debug!(provider = %self.id, error = %error, "model listing failed, using fallback list");
                self.fallback_models(&settings)
            }
        }
    }

    async fn test_connection(&self, model_id: Option<&str>) -> ConnectionStatus {
        let settings = self.settings();
        if let Err(error) = self.check_configured(&settings) {
            return ConnectionStatus::failed(error.to_string());
        }

        let endpoint = self.endpoint(&settings);
        let model = self
            .resolve_model(&settings, model_id.unwrap_or_default())
            .unwrap_or_default();
        let target = CallTarget {
            endpoint: &endpoint,
            api_key: settings.api_key.as_ref(),
            model: &model,
            extra_options: &settings.extra_options,
        };

        let probe = match self.wire.build_probe(&target) {
            Ok(probe) => probe,
            Err(error) => return ConnectionStatus::failed(error.to_string()),
        };

        match self.transport.send(&probe).await {
            Ok(_) => ConnectionStatus::ok(format!("connected to {} at {endpoint}", self.preset.kind)),
            Err(LlmError::RemoteApi {
                status: Some(401 | 403),
                message,
            }) => ConnectionStatus::failed(format!("authentication failed: {message}")),
            Err(LlmError::RemoteApi {
                status: Some(404),
                message,
            }) => ConnectionStatus::failed(format!("endpoint or model not found: {message}")),
            Err(LlmError::Network(message)) => {
                ConnectionStatus::failed(format!("could not reach {endpoint}: {message}"))
            }
            Err(error) => ConnectionStatus::failed(error.to_string()),
        }
    }

    fn reload(&self, settings: ProviderSettings) {
        let settings = Arc::new(settings);
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        tracing::info!(provider = %self.id, "settings reloaded");
    }
}
