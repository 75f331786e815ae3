//! Mock LLM backends for integration tests
//!
//! One server speaks the OpenAI, Anthropic and Ollama dialects on their
//! usual paths and returns predictable replies.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONTENT: &str = "Hello from mock LLM";

/// Running mock server; shuts down on drop
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    request_count: AtomicU32,
    /// Requests still to be rejected with `fail_status`
    fail_remaining: AtomicU32,
    fail_status: StatusCode,
    /// Delay before answering any request
    delay: Option<Duration>,
    /// Streams send their first fragment and then hang
    stall: bool,
    content: String,
    last_body: Mutex<Value>,
    last_headers: Mutex<HeaderMap>,
}

/// Configures a [`MockBackend`] before it starts
pub struct MockBuilder {
    content: String,
    fail_count: u32,
    fail_status: StatusCode,
    delay: Option<Duration>,
    stall: bool,
}

impl MockBuilder {
    /// Reply text (also the emulated tool-call payload when relevant)
    pub fn content(mut self, content: &str) -> Self {
        content.clone_into(&mut self.content);
        self
    }

    /// Reject the first `count` requests with `status`
    pub const fn failing(mut self, count: u32, status: StatusCode) -> Self {
        self.fail_count = count;
        self.fail_status = status;
        self
    }

    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub const fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    pub async fn start(self) -> anyhow::Result<MockBackend> {
        let state = Arc::new(MockState {
            request_count: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(self.fail_count),
            fail_status: self.fail_status,
            delay: self.delay,
            stall: self.stall,
            content: self.content,
            last_body: Mutex::new(Value::Null),
            last_headers: Mutex::new(HeaderMap::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai_chat))
            .route("/v1/completions", routing::post(openai_completions))
            .route("/v1/models", routing::get(models))
            .route("/v1/messages", routing::post(anthropic_messages))
            .route("/api/chat", routing::post(ollama_chat))
            .route("/api/generate", routing::post(ollama_generate))
            .route("/api/tags", routing::get(ollama_tags))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockBackend { addr, shutdown, state })
    }
}

impl MockBackend {
    pub fn builder() -> MockBuilder {
        MockBuilder {
            content: DEFAULT_CONTENT.to_owned(),
            fail_count: 0,
            fail_status: StatusCode::INTERNAL_SERVER_ERROR,
            delay: None,
            stall: false,
        }
    }

    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Endpoint for OpenAI-compatible and Anthropic providers
    pub fn v1_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Endpoint for Ollama providers
    pub fn root_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::SeqCst)
    }

    /// JSON body of the most recent request (`null` for GETs)
    pub fn last_body(&self) -> Value {
        self.state.last_body.lock().unwrap().clone()
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.state
            .last_headers
            .lock()
            .unwrap()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Address nothing listens on
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

impl MockState {
    /// Record the request and apply configured delay and failures
    async fn admit(&self, headers: &HeaderMap, body: &Value) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        *self.last_body.lock().unwrap() = body.clone();
        *self.last_headers.lock().unwrap() = headers.clone();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            return Some(error_response(self.fail_status, "mock server intentional failure"));
        }
        None
    }

    fn pieces(&self) -> Vec<String> {
        self.content.split_inclusive(' ').map(str::to_owned).collect()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "message": message,
                "type": "server_error"
            }
        })),
    )
        .into_response()
}

fn wants_stream(body: &Value) -> bool {
    body["stream"].as_bool().unwrap_or(false)
}

fn has_tools(body: &Value) -> bool {
    body["tools"].as_array().is_some_and(|tools| !tools.is_empty())
}

fn streamed(content_type: &'static str, chunks: Vec<String>, stall: bool) -> Response {
    let chunks = stream::iter(chunks.into_iter().map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))));
    let body = if stall {
        Body::from_stream(chunks.chain(stream::pending()))
    } else {
        Body::from_stream(chunks)
    };

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn sse(mut events: Vec<Value>, keep_when_stalled: usize, stall: bool, done_marker: bool) -> Response {
    if stall {
        events.truncate(keep_when_stalled);
    }
    let mut chunks: Vec<String> = events.iter().map(|event| format!("data: {event}\n\n")).collect();
    if done_marker && !stall {
        chunks.push("data: [DONE]\n\n".to_owned());
    }
    streamed("text/event-stream", chunks, stall)
}

fn ndjson(mut lines: Vec<Value>, stall: bool) -> Response {
    if stall {
        lines.truncate(1);
    }
    let chunks = lines.iter().map(|line| format!("{line}\n")).collect();
    streamed("application/x-ndjson", chunks, stall)
}

// -- OpenAI --

async fn openai_chat(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(rejection) = state.admit(&headers, &body).await {
        return rejection;
    }

    if wants_stream(&body) {
        let mut events = vec![json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]})];
        events.extend(
            state
                .pieces()
                .into_iter()
                .map(|piece| json!({"choices": [{"index": 0, "delta": {"content": piece}}]})),
        );
        events.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}));
        return sse(events, 2, state.stall, true);
    }

    let message = if has_tools(&body) {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_test_123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":\"San Francisco\"}"}
            }]
        })
    } else {
        json!({"role": "assistant", "content": state.content})
    };

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": if has_tools(&body) { "tool_calls" } else { "stop" }
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

async fn openai_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = state.admit(&headers, &body).await {
        return rejection;
    }

    if wants_stream(&body) {
        let events = state
            .pieces()
            .into_iter()
            .map(|piece| json!({"choices": [{"index": 0, "text": piece}]}))
            .collect();
        return sse(events, 1, state.stall, true);
    }

    Json(json!({
        "object": "text_completion",
        "choices": [{"index": 0, "text": state.content, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

async fn models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(rejection) = state.admit(&headers, &Value::Null).await {
        return rejection;
    }

    Json(json!({
        "object": "list",
        "data": [
            {"id": "mock-model-1", "owned_by": "mock", "display_name": "Mock Model 1"},
            {"id": "mock-model-2", "owned_by": "mock", "display_name": "Mock Model 2"}
        ]
    }))
    .into_response()
}

// -- Anthropic --

async fn anthropic_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = state.admit(&headers, &body).await {
        return rejection;
    }

    if !headers.contains_key("x-api-key") || !headers.contains_key("anthropic-version") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })),
        )
            .into_response();
    }

    if wants_stream(&body) {
        let mut events = vec![json!({"type": "message_start", "message": {"id": "msg_1", "role": "assistant"}})];
        events.push(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}));
        events.extend(state.pieces().into_iter().map(|piece| {
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": piece}})
        }));
        events.push(json!({"type": "content_block_stop", "index": 0}));
        events.push(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}}));
        events.push(json!({"type": "message_stop"}));
        return sse(events, 3, state.stall, false);
    }

    let (content, stop_reason) = if has_tools(&body) {
        (
            json!([
                {"type": "text", "text": ""},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "San Francisco"}}
            ]),
            "tool_use",
        )
    } else {
        (json!([{"type": "text", "text": state.content}]), "end_turn")
    };

    Json(json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": content,
        "stop_reason": stop_reason,
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))
    .into_response()
}

// -- Ollama --

async fn ollama_chat(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(rejection) = state.admit(&headers, &body).await {
        return rejection;
    }

    if wants_stream(&body) {
        let mut lines: Vec<Value> = state
            .pieces()
            .into_iter()
            .map(|piece| json!({"message": {"role": "assistant", "content": piece}, "done": false}))
            .collect();
        lines.push(json!({
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        }));
        return ndjson(lines, state.stall);
    }

    let message = if has_tools(&body) {
        json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{"function": {"name": "get_weather", "arguments": {"location": "San Francisco"}}}]
        })
    } else {
        json!({"role": "assistant", "content": state.content})
    };

    Json(json!({
        "model": body["model"],
        "message": message,
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 10,
        "eval_count": 5
    }))
    .into_response()
}

async fn ollama_generate(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = state.admit(&headers, &body).await {
        return rejection;
    }

    if wants_stream(&body) {
        let mut lines: Vec<Value> = state
            .pieces()
            .into_iter()
            .map(|piece| json!({"response": piece, "done": false}))
            .collect();
        lines.push(json!({"response": "", "done": true, "done_reason": "stop"}));
        return ndjson(lines, state.stall);
    }

    Json(json!({
        "model": body["model"],
        "response": state.content,
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 10,
        "eval_count": 5
    }))
    .into_response()
}

async fn ollama_tags(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(rejection) = state.admit(&headers, &Value::Null).await {
        return rejection;
    }

    Json(json!({
        "models": [
            {"name": "llama3:8b", "model": "llama3:8b"},
            {"name": "qwen2.5:7b", "model": "qwen2.5:7b"}
        ]
    }))
    .into_response()
}
