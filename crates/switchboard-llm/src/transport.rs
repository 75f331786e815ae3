//! HTTP exchange behind a trait seam
//!
//! Adapters only see [`Transport`]; tests substitute a spy, production uses
//! [`HttpTransport`]. Aborting a call means dropping its future or stream.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, Method};
use reqwest::Client;
use serde_json::Value;
use switchboard_config::TransportConfig;
use url::Url;

use crate::error::LlmError;

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A fully built backend call
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Request/response and streaming exchange with a backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and decode the JSON reply
    async fn send(&self, request: &TransportRequest) -> Result<Value, LlmError>;

    /// Send a request and hand back the body as it arrives
    async fn open_stream(&self, request: &TransportRequest) -> Result<ByteStream, LlmError>;
}

/// [`Transport`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// `request_timeout` bounds non-streaming calls and the wait for a
    /// stream's response headers; once a stream is open it runs until
    /// completion or cancellation
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self, LlmError> {
        let connect = config
            .connect_timeout()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        let request = config
            .request_timeout()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Self::new(connect, request)
    }

    fn builder(&self, request: &TransportRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        builder
    }

    async fn execute(&self, builder: reqwest::RequestBuilder, url: &Url) -> Result<reqwest::Response, LlmError> {
        let response = builder.send().await.map_err(|e| {
            let error = LlmError::from(e);
            tracing::debug!(host = ?url.host_str(), path = %url.path(), error = %error, "backend request failed");
            error
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(host = ?url.host_str(), path = %url.path(), status = %status, "backend returned error");

        Err(LlmError::RemoteApi {
            status: Some(status.as_u16()),
            message: error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            }),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<Value, LlmError> {
        let builder = self.builder(request).timeout(self.request_timeout);
        let response = self.execute(builder, &request.url).await?;

        Ok(response.json::<Value>().await?)
    }

    async fn open_stream(&self, request: &TransportRequest) -> Result<ByteStream, LlmError> {
        let response = tokio::time::timeout(self.request_timeout, self.execute(self.builder(request), &request.url))
            .await
            .map_err(|_| {
                tracing::debug!(
                    host = ?request.url.host_str(),
                    path = %request.url.path(),
                    timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                    "backend did not answer the stream request"
                );
                LlmError::Network("timed out waiting for response headers".to_owned())
            })??;

        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(LlmError::from))))
    }
}

const MAX_ERROR_MESSAGE_CHARS: usize = 512;

/// Pull a human-readable message out of a backend error body
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}` and `{"detail": ..}`; otherwise the trimmed body.
/// Either way the result is capped at 512 characters.
pub fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Some(clip(trimmed));
    };

    let message = match value.get("error") {
        Some(Value::Object(error)) => error.get("message").and_then(Value::as_str),
        Some(Value::String(error)) => Some(error.as_str()),
        _ => None,
    }
    .or_else(|| value.get("message").and_then(Value::as_str))
    .or_else(|| value.get("detail").and_then(Value::as_str));

    Some(clip(message.unwrap_or(trimmed)))
}

fn clip(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelopes() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#)
                .as_deref(),
            Some("Incorrect API key provided")
        );
        assert_eq!(
            error_message(r#"{"error":"model 'llama9' not found"}"#).as_deref(),
            Some("model 'llama9' not found")
        );
        assert_eq!(
            error_message(r#"{"type":"error","message":"overloaded"}"#).as_deref(),
            Some("overloaded")
        );
        assert_eq!(error_message("Bad Gateway\n").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_message("   "), None);
    }

    #[test]
    fn long_messages_are_capped() {
        let long = "x".repeat(2_000);
        let envelope = serde_json::json!({"error": {"message": long}}).to_string();
        assert_eq!(error_message(&envelope).map(|m| m.chars().count()), Some(512));
        assert_eq!(error_message(&long).map(|m| m.chars().count()), Some(512));
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        // port 9 (discard) is closed on loopback in test environments
        let request = TransportRequest::get(Url::parse("http://127.0.0.1:9/v1/models").unwrap());
        let err = transport.send(&request).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    async fn errors_never_echo_query_credentials() {
        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let url = Url::parse("http://127.0.0.1:9/v1beta/models/gemini-1.5-flash?key=AIza-secret-42").unwrap();
        let err = transport.send(&TransportRequest::get(url)).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert!(!err.to_string().contains("AIza-secret-42"), "{err}");
    }

    #[tokio::test]
    async fn silent_backend_times_out_before_stream_opens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_millis(100)).unwrap();
        let url = Url::parse(&format!("http://{addr}/v1/chat/completions")).unwrap();
        let request = TransportRequest::post(url, serde_json::json!({"stream": true}));

        let Err(err) = transport.open_stream(&request).await else {
            panic!("stream opened against a silent backend");
        };
        assert!(err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("timed out"), "{err}");
        server.abort();
    }
}
