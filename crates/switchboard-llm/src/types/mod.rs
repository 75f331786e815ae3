//! Provider-agnostic request and result types
//!
//! Every adapter consumes and produces these regardless of the backend's
//! own wire format.

pub mod message;
pub mod request;
pub mod result;
pub mod tool;

pub use message::{ConversationMessage, Role};
pub use request::GenerationRequest;
pub use result::{ConnectionStatus, FinishReason, GenerationResult, ModelInfo, Usage};
pub use tool::{ToolCallRequest, ToolDefinition, ToolSet};
