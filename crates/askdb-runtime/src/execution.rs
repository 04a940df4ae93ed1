//! Execution step: run every capability request from the latest
//! assistant message and append one result per request, in order.

use std::sync::Arc;

use askdb_capabilities::{CapabilityRegistry, InvocationContext};
use askdb_core::messages::Message;
use askdb_core::outcome::{CapabilityOutcome, FailureKind};
use askdb_core::text::{clip, first_line};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::state::SessionState;

/// Failure details are clamped before entering the transcript; a full
/// stack trace or warehouse error dump would crowd out the rest of the
/// engine's context.
const MAX_DETAIL_CHARS: usize = 2_000;

/// Execute the pending requests from the last assistant message.
///
/// Failures never bubble up: an unknown capability, a validation
/// error, a timeout, or an execution error all become a
/// [`CapabilityOutcome::Failure`] in the transcript, which the next
/// generation pass sees and can correct.
#[instrument(skip_all, fields(session_id = %state.session_id))]
pub async fn execute_requests(
    registry: &Arc<CapabilityRegistry>,
    state: &mut SessionState,
    cancellation: &CancellationToken,
) {
    let requests = state.last_assistant_requests();
    debug!(count = requests.len(), "executing capability requests");

    for request in requests {
        let outcome = match registry.get(&request.name) {
            None => {
                warn!(capability = %request.name, "unknown capability requested");
                CapabilityOutcome::failure(
                    FailureKind::Request,
                    format!("unknown capability '{}'", request.name),
                )
            }
            Some(capability) => {
                let context = InvocationContext {
                    request_id: request.id.clone(),
                    session_id: state.session_id.clone(),
                    cancellation: cancellation.clone(),
                };
                invoke_one(capability.as_ref(), &request.arguments, &context).await
            }
        };

        counter!(
            "askdb_capability_invocations_total",
            "capability" => request.name.clone(),
            "status" => if outcome.is_failure() { "failure" } else { "success" },
        )
        .increment(1);
        state.push(Message::capability_result(request.id, request.name, outcome));
    }
}

/// Invoke a single capability under its own timeout, if it declares one.
async fn invoke_one(
    capability: &dyn askdb_capabilities::Capability,
    arguments: &serde_json::Map<String, serde_json::Value>,
    context: &InvocationContext,
) -> CapabilityOutcome {
    let kind = capability.failure_kind();
    let invocation = capability.invoke(arguments, context);
    let result = match capability.timeout_ms() {
        Some(timeout_ms) => {
            match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), invocation)
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    return CapabilityOutcome::failure(
                        kind,
                        format!("timed out after {timeout_ms}ms"),
                    )
                }
            }
        }
        None => invocation.await,
    };
    match result {
        Ok(payload) => CapabilityOutcome::Success(payload),
        Err(error) => {
            let detail = error.to_string();
            warn!(request_id = %context.request_id, cause = first_line(&detail), "capability failed");
            CapabilityOutcome::failure(kind, clip(&detail, MAX_DETAIL_CHARS))
        }
    }
}
