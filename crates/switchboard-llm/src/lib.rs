//! Provider normalization core for Switchboard
//!
//! Presents roughly two dozen hosted and local text-generation backends
//! through one adapter contract: prompt formatting, tool-call extraction,
//! retry with backoff, and cancellation propagation.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod cancel;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod format;
pub mod phase;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod stream;
pub mod transport;
pub mod types;
pub mod wire;

pub use adapter::{Adapter, FragmentStream, ProviderAdapter};
pub use cancel::CancellationBridge;
pub use error::LlmError;
pub use extract::{ToolCallExtractor, ToolStrategy};
pub use format::{FormattedPrompt, PromptFamily, PromptFormatter};
pub use registry::ProviderRegistry;
pub use retry::{RetryExecutor, RetryPolicy};
pub use transport::{HttpTransport, Transport};
pub use types::{
    ConnectionStatus, ConversationMessage, FinishReason, GenerationRequest, GenerationResult, ModelInfo, Role,
    ToolCallRequest, ToolDefinition, ToolSet, Usage,
};
