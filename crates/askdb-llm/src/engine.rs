//! # Engine Trait
//!
//! Core abstraction for language model backends. The workflow controller
//! holds an `Arc<dyn Engine>` and never talks to a concrete API directly,
//! so tests can substitute a scripted engine and the model backend can be
//! swapped without touching control flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use askdb_core::descriptor::CapabilityDescriptor;
use askdb_core::messages::{AssistantBlock, Message};

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (missing or invalid API key).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the backend.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Backend returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// The response carried no usable candidate.
    #[error("empty completion: {message}")]
    EmptyCompletion {
        /// Error description.
        message: String,
    },
}

impl EngineError {
    /// Whether this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Json(_) | Self::Auth { .. } | Self::EmptyCompletion { .. } => false,
        }
    }

    /// Error category string for log and metric labels.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::EmptyCompletion { .. } => "empty",
        }
    }
}

/// Sampling options for a completion request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingOptions {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A completion request: system prompt, transcript, and advertised
/// capabilities.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// System instruction, if any.
    pub system: Option<String>,
    /// Transcript messages, oldest first.
    pub messages: Vec<Message>,
    /// Capabilities the model may request. Empty disables requests.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Sampling options.
    pub options: SamplingOptions,
}

/// A completed model response.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    /// Content blocks: text and/or capability requests, in emission order.
    pub content: Vec<AssistantBlock>,
}

impl Completion {
    /// Convert into an assistant [`Message`] for transcript appending.
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::Assistant {
            content: self.content,
        }
    }
}

/// Core language engine trait.
///
/// Implementors must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Current model ID (e.g. `"gemini-2.0-flash"`).
    fn model(&self) -> &str;

    /// Request a completion for the given transcript.
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion>;
}
