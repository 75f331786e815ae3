use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use switchboard_llm::types::tool::tool_set;
use switchboard_llm::{FinishReason, GenerationRequest, ProviderAdapter, ProviderRegistry, ToolDefinition, ToolSet};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

fn adapter(registry: &ProviderRegistry, id: &str) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    registry.get(id).with_context(|| {
        format!(
            "unknown provider '{id}' (configured: {})",
            registry.ids().join(", ")
        )
    })
}

pub fn providers(registry: &ProviderRegistry) {
    for id in registry.ids() {
        let Some(adapter) = registry.get(&id) else {
            continue;
        };
        let state = if adapter.is_configured() { "ready" } else { "missing api key" };
        println!("{id}\t{}\t{state}", adapter.kind());
    }
}

pub async fn models(registry: &ProviderRegistry, id: &str) -> anyhow::Result<()> {
    for model in adapter(registry, id)?.list_models().await {
        match model.name {
            Some(name) if name != model.id => println!("{}\t{name}", model.id),
            _ => println!("{}", model.id),
        }
    }
    Ok(())
}

pub async fn test(registry: &ProviderRegistry, id: &str, model: Option<&str>) -> anyhow::Result<()> {
    let status = adapter(registry, id)?.test_connection(model).await;
    if status.success {
        println!("ok: {}", status.message);
        Ok(())
    } else {
        anyhow::bail!("{id}: {}", status.message)
    }
}

pub fn read_tools(path: &Path) -> anyhow::Result<ToolSet> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let definitions: Vec<ToolDefinition> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of tools", path.display()))?;
    Ok(tool_set(definitions))
}

pub async fn generate(
    registry: &ProviderRegistry,
    id: &str,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let result = adapter(registry, id)?.generate(request, Some(cancel), None).await;

    if let Some(error) = result.error() {
        anyhow::bail!("{id}: {error}");
    }

    match result.finish_reason() {
        FinishReason::Cancelled => eprintln!("cancelled"),
        FinishReason::ToolCall => {
            if let Some(call) = result.tool_call_request() {
                println!("{}", serde_json::to_string_pretty(call)?);
            }
        }
        reason => {
            println!("{}", result.content());
            if reason == FinishReason::Length {
                eprintln!("(stopped at max_tokens)");
            }
        }
    }

    if let Some(usage) = result.usage() {
        tracing::info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "token usage"
        );
    }
    Ok(())
}

pub async fn stream(
    registry: &ProviderRegistry,
    id: &str,
    request: &GenerationRequest,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut fragments = adapter(registry, id)?.stream_generate(request, Some(cancel.clone()));
    let mut stdout = tokio::io::stdout();

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment.with_context(|| format!("{id}: stream failed"))?;
        stdout.write_all(fragment.as_bytes()).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;

    if cancel.is_cancelled() {
        eprintln!("cancelled");
    }
    Ok(())
}
