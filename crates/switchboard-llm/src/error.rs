use thiserror::Error;

use crate::types::FinishReason;

/// Errors that can occur during a provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Missing credential, bad endpoint, or an unusable template
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection refused or timed out
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status or rejected the request
    #[error("remote API error{}: {message}", status_suffix(.status.as_ref()))]
    RemoteApi {
        /// HTTP status, when one was received
        status: Option<u16>,
        message: String,
    },

    /// Caller cancelled the call
    #[error("cancelled")]
    Cancelled,

    /// Reply body or stream frame could not be decoded
    #[error("parse error: {0}")]
    Parse(String),
}

fn status_suffix(status: Option<&u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl LlmError {
    /// Whether the failure may succeed on a later attempt
    ///
    /// Only network failures qualify; everything else is terminal.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub const fn finish_reason(&self) -> FinishReason {
        match self {
            Self::Cancelled => FinishReason::Cancelled,
            _ => FinishReason::Error,
        }
    }

    /// HTTP status carried by a remote API error
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => *status,
            _ => None,
        }
    }

    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteApi {
            status,
            message: message.into(),
        }
    }
}

/// The URL is stripped first: it may carry a query-string credential.
impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() || error.is_connect() {
            Self::Network(error.to_string())
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else if error.is_builder() {
            Self::Configuration(error.to_string())
        } else {
            Self::RemoteApi {
                status: error.status().map(|s| s.as_u16()),
                message: error.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
