//! Capability error types.
//!
//! Unified error enum for all capability failures. The runtime maps
//! these to typed failure outcomes; the display text becomes the
//! failure detail shown to the model.

use thiserror::Error;

/// Errors that can occur during capability execution.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Argument validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// HTTP request to a backing service failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding/decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Warehouse rejected or failed the query.
    #[error("query failed: {message}")]
    Query {
        /// Warehouse-reported cause.
        message: String,
    },

    /// Subprocess exited non-zero or could not be spawned.
    #[error("process failed: {message}")]
    Process {
        /// Captured stderr or spawn failure.
        message: String,
    },

    /// Similarity cache access failed.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// Engine call (metadata summarization) failed.
    #[error("engine error: {0}")]
    Engine(#[from] askdb_llm::EngineError),

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}
