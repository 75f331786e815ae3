mod harness;

use futures_util::StreamExt;
use harness::config::{ConfigBuilder, adapter, provider};
use harness::mock_backend::{DEFAULT_CONTENT, MockBackend};
use serde_json::json;
use switchboard_config::ProviderKind;
use switchboard_llm::types::tool::tool_set;
use switchboard_llm::{ConversationMessage, FinishReason, GenerationRequest, ToolDefinition};

#[tokio::test]
async fn messages_reply_is_normalized() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.v1_url())
        .registry();

    let request = GenerationRequest::new("", "ignored").with_system_prompt("Be kind.").with_history(vec![
        ConversationMessage::user("Hi"),
        ConversationMessage::assistant("Hello!"),
        ConversationMessage::user("How are you?"),
    ]);
    let result = adapter(&registry, "claude").generate(&request, None, None).await;

    assert_eq!(result.content(), DEFAULT_CONTENT);
    assert_eq!(result.finish_reason(), FinishReason::Stop);
    assert_eq!(result.usage().unwrap().prompt_tokens, 10);

    let body = mock.last_body();
    assert_eq!(body["system"], "Be kind.");
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
    assert_eq!(body["messages"][2]["content"], "How are you?");
    assert!(body["max_tokens"].as_u64().is_some());
    assert_eq!(mock.last_header("x-api-key").as_deref(), Some("test-key"));
    assert!(mock.last_header("anthropic-version").is_some());
}

#[tokio::test]
async fn tool_use_block_becomes_tool_call() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.v1_url())
        .registry();
    let tools = tool_set([ToolDefinition::new(
        "get_weather",
        "Get current weather",
        json!({"type": "object", "properties": {"location": {"type": "string"}}}),
    )]);

    let result = adapter(&registry, "claude")
        .generate(&GenerationRequest::new("", "Weather?"), None, Some(&tools))
        .await;

    let call = result.tool_call_request().unwrap();
    assert_eq!(call.id.as_deref(), Some("toolu_1"));
    assert_eq!(call.arguments["location"], "San Francisco");
    assert_eq!(mock.last_body()["tools"][0]["input_schema"]["type"], "object");
}

#[tokio::test]
async fn streaming_stops_at_message_stop() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.v1_url())
        .registry();

    let text: String = adapter(&registry, "claude")
        .stream_generate(&GenerationRequest::new("", "Hello"), None)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(text, DEFAULT_CONTENT);
}

#[tokio::test]
async fn models_carry_display_names() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.v1_url())
        .registry();

    let models = adapter(&registry, "claude").list_models().await;

    assert_eq!(models[0].name.as_deref(), Some("Mock Model 1"));
}

#[tokio::test]
async fn missing_key_is_reported_without_a_request() {
    let mock = MockBackend::start().await.unwrap();
    let mut config = provider(ProviderKind::Anthropic, &mock.v1_url());
    config.api_key = None;
    let registry = ConfigBuilder::new().with_provider_config("claude", config).registry();
    let adapter = adapter(&registry, "claude");

    assert!(!adapter.is_configured());
    let result = adapter.generate(&GenerationRequest::new("", "Hi"), None, None).await;
    let status = adapter.test_connection(None).await;

    assert!(result.is_error());
    assert!(!status.success);
    assert_eq!(mock.request_count(), 0);
}
