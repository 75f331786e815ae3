mod harness;

use futures_util::StreamExt;
use harness::config::{ConfigBuilder, adapter, templated};
use harness::mock_backend::{DEFAULT_CONTENT, MockBackend};
use switchboard_config::{ProviderKind, TemplateName};
use switchboard_llm::{FinishReason, GenerationRequest};

#[tokio::test]
async fn chat_reply_is_normalized() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("local", ProviderKind::Ollama, &mock.root_url())
        .registry();

    let mut request = GenerationRequest::new("llama3:8b", "Hello");
    request.temperature = Some(0.2);
    request.max_tokens = Some(64);
    let result = adapter(&registry, "local").generate(&request, None, None).await;

    assert_eq!(result.content(), DEFAULT_CONTENT);
    assert_eq!(result.usage().unwrap().completion_tokens, 5);

    let body = mock.last_body();
    assert_eq!(body["model"], "llama3:8b");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 64);
}

#[tokio::test]
async fn ndjson_stream_is_split_into_fragments() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("local", ProviderKind::Ollama, &mock.root_url())
        .registry();

    let fragments: Vec<String> = adapter(&registry, "local")
        .stream_generate(&GenerationRequest::new("", "Hello"), None)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(fragments.len(), 4);
    assert_eq!(fragments.concat(), DEFAULT_CONTENT);
}

#[tokio::test]
async fn raw_generate_sends_templated_prompt() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider_config("raw", templated(ProviderKind::OllamaRaw, &mock.root_url(), TemplateName::Llama3))
        .registry();

    let request = GenerationRequest::new("", "Hi").with_system_prompt("Be brief.");
    let result = adapter(&registry, "raw").generate(&request, None, None).await;

    assert_eq!(result.content(), DEFAULT_CONTENT);
    assert_eq!(result.finish_reason(), FinishReason::Stop);

    let body = mock.last_body();
    assert_eq!(body["raw"], true);
    assert_eq!(
        body["prompt"],
        "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>\
         <|start_header_id|>user<|end_header_id|>\n\nHi<|eot_id|>\
         <|start_header_id|>assistant<|end_header_id|>\n\n"
    );
    assert!(
        body["options"]["stop"]
            .as_array()
            .unwrap()
            .iter()
            .any(|stop| stop == "<|eot_id|>")
    );
}

#[tokio::test]
async fn chat_kind_with_text_template_uses_generate() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider_config("local", templated(ProviderKind::Ollama, &mock.root_url(), TemplateName::Chatml))
        .registry();

    let text: String = adapter(&registry, "local")
        .stream_generate(&GenerationRequest::new("", "Hello"), None)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(text, DEFAULT_CONTENT);
    assert!(mock.last_body()["prompt"].as_str().unwrap().starts_with("<|im_start|>user\nHello"));
}

#[tokio::test]
async fn tags_are_listed_as_models() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("local", ProviderKind::Ollama, &mock.root_url())
        .registry();

    let ids: Vec<String> = adapter(&registry, "local")
        .list_models()
        .await
        .into_iter()
        .map(|model| model.id)
        .collect();

    assert_eq!(ids, ["llama3:8b", "qwen2.5:7b"]);
}

#[tokio::test]
async fn completions_endpoint_with_chatml_template() {
    let mock = MockBackend::start().await.unwrap();
    let registry = ConfigBuilder::new()
        .with_provider("cpp", ProviderKind::Llamacpp, &mock.v1_url())
        .registry();

    let result = adapter(&registry, "cpp")
        .generate(&GenerationRequest::new("", "Hello"), None, None)
        .await;

    assert_eq!(result.content(), DEFAULT_CONTENT);
    let body = mock.last_body();
    assert!(body["prompt"].as_str().unwrap().ends_with("<|im_start|>assistant\n"));
    assert_eq!(body["stop"][0], "<|im_end|>");
}
