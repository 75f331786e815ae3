#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod log;

use serde::Deserialize;

pub use llm::*;
pub use log::*;

/// Top-level Switchboard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
}
