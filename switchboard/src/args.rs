use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Switchboard LLM provider console
#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "Talk to hosted and local LLM backends through one interface")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchboard.toml", env = "SWITCHBOARD_CONFIG", global = true)]
    pub config: PathBuf,

    /// Override the configured log filter
    #[arg(long, env = "SWITCHBOARD_LOG", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured providers
    Providers,

    /// List the models a provider offers
    Models {
        /// Provider id
        provider: String,
    },

    /// Check that a provider is reachable and accepts its credentials
    Test {
        /// Provider id
        provider: String,

        /// Model to probe with
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate a reply
    Generate {
        /// Provider id
        provider: String,

        /// User prompt
        #[arg(short, long)]
        prompt: String,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Model id; defaults to the provider's default model
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// JSON file holding an array of tool definitions
        #[arg(long)]
        tools: Option<PathBuf>,

        /// Print fragments as they arrive
        #[arg(long, conflicts_with = "tools")]
        stream: bool,
    },
}
