//! Controller error types.
//!
//! Capability failures never appear here: they become typed failure
//! outcomes inside the transcript and feed the retry machinery. This
//! enum covers the errors that end a run.

use thiserror::Error;

/// Errors that end a controller run.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The transcript holds no user message to answer.
    #[error("no user question in the transcript")]
    MissingQuestion,

    /// An engine call failed.
    #[error("engine call failed: {0}")]
    Engine(#[from] askdb_llm::EngineError),

    /// The run was cancelled between steps.
    #[error("run cancelled")]
    Cancelled,
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
