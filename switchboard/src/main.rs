#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod commands;

use std::sync::Arc;

use args::{Args, Command};
use clap::Parser;
use switchboard_config::Config;
use switchboard_llm::{HttpTransport, ProviderRegistry};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    switchboard_telemetry::init(&config.log, args.log_filter.as_deref())?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    let transport = HttpTransport::from_config(&config.llm.transport)?;
    let registry = ProviderRegistry::from_config(&config.llm, Arc::new(transport))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match args.command {
        Command::Providers => {
            commands::providers(&registry);
            Ok(())
        }
        Command::Models { provider } => commands::models(&registry, &provider).await,
        Command::Test { provider, model } => commands::test(&registry, &provider, model.as_deref()).await,
        Command::Generate {
            provider,
            prompt,
            system,
            model,
            temperature,
            max_tokens,
            tools,
            stream,
        } => {
            let mut request = switchboard_llm::GenerationRequest::new(model.unwrap_or_default(), prompt);
            request.system_prompt = system;
            request.temperature = temperature;
            request.max_tokens = max_tokens;
            if let Some(path) = tools {
                request.tool_definitions = commands::read_tools(&path)?;
            }

            if stream {
                commands::stream(&registry, &provider, &request, cancel).await
            } else {
                commands::generate(&registry, &provider, &request, &cancel).await
            }
        }
    }
}
