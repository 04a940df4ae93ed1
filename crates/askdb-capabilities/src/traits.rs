//! Core capability trait and invocation context.
//!
//! Every capability implements [`Capability`]: a schema for the engine,
//! a failure kind for rendering, and an async `invoke`. Implementations
//! are `Send + Sync` and shared behind `Arc` across a session.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use askdb_core::descriptor::CapabilityDescriptor;
use askdb_core::outcome::{CapabilityPayload, FailureKind};

use crate::errors::CapabilityError;

/// Execution context passed to every capability invocation.
#[derive(Clone, Debug)]
pub struct InvocationContext {
    /// Unique ID of this capability request.
    pub request_id: String,
    /// Session ID of the run invoking this capability.
    pub session_id: String,
    /// Cancellation token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    /// Context for tests: fixed IDs, fresh token.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            request_id: "call-test".into(),
            session_id: "session-test".into(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// The core trait that every capability must implement.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Capability name, the exact string sent to/from the engine.
    fn name(&self) -> &str;

    /// Failure kind used when an invocation errors.
    fn failure_kind(&self) -> FailureKind;

    /// Optional per-capability timeout in milliseconds. The execution
    /// step wraps `invoke` with this timeout when set.
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Generate the schema advertised to the engine.
    fn descriptor(&self) -> CapabilityDescriptor;

    /// Execute the capability with JSON arguments.
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<CapabilityPayload, CapabilityError>;
}

/// Fetch a required string argument, or fail validation.
pub fn require_str<'a>(
    arguments: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, CapabilityError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::Validation {
            message: format!("missing or non-string argument `{key}`"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_str_present() {
        let mut args = Map::new();
        let _ = args.insert("query".into(), json!("SELECT 1"));
        assert_eq!(require_str(&args, "query").unwrap(), "SELECT 1");
    }

    #[test]
    fn require_str_missing_fails_validation() {
        let args = Map::new();
        let err = require_str(&args, "query").unwrap_err();
        assert!(err.to_string().contains("`query`"));
    }

    #[test]
    fn require_str_non_string_fails_validation() {
        let mut args = Map::new();
        let _ = args.insert("query".into(), json!(42));
        assert!(matches!(
            require_str(&args, "query").unwrap_err(),
            CapabilityError::Validation { .. }
        ));
    }
}
