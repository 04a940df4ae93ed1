//! Generation step: ask the engine for the next assistant message,
//! injecting failure context or a give-up message as the retry budget
//! dictates.

use std::sync::Arc;

use askdb_core::descriptor::CapabilityDescriptor;
use askdb_core::messages::Message;
use askdb_core::outcome::FailureKind;
use askdb_llm::{CompletionRequest, Engine, SamplingOptions};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::errors::{ControllerError, Result};
use crate::state::SessionState;

/// Everything that distinguishes one generation site from another.
///
/// The data-retrieval loop and the post-processing loop both run the
/// same step with a different spec: different system prompt, capability
/// surface, failure scope, and terminal message.
pub struct GenerationSpec<'a> {
    /// System prompt for this pass, with the consolidated scalars (or
    /// their sentinels) already interpolated.
    pub system_prompt: String,
    /// Capabilities the engine may request here.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// The failure kind this sub-loop retries on.
    pub failure_kind: FailureKind,
    /// Corrective instruction appended after a failure.
    pub retry_instruction: &'a str,
    /// Assistant text emitted when the retry budget is exhausted.
    pub give_up_message: &'a str,
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    /// Sampling options forwarded to the engine.
    pub options: SamplingOptions,
}

/// Produce the next assistant message and push it onto the transcript.
///
/// When the failure streak has exceeded the budget, a single terminal
/// assistant message is pushed instead and the engine is not called at
/// all. When the last transcript entry is a failure of this spec's
/// kind, the engine sees the failed request, its error result, and the
/// corrective instruction appended after the transcript.
#[instrument(skip_all, fields(session_id = %state.session_id, retry_count = state.retry_count))]
pub async fn generate(
    engine: &Arc<dyn Engine>,
    state: &mut SessionState,
    spec: &GenerationSpec<'_>,
) -> Result<()> {
    if state.question().is_none() {
        return Err(ControllerError::MissingQuestion);
    }

    if state.retry_count > spec.max_retries {
        warn!(max_retries = spec.max_retries, "retry budget exhausted, giving up");
        counter!("askdb_generation_give_ups_total").increment(1);
        state.push(Message::assistant_text(spec.give_up_message));
        return Ok(());
    }

    let mut messages: Vec<Message> = state.transcript().to_vec();
    if let Some((kind, failure_index)) = state.last_failure() {
        if kind == spec.failure_kind {
            append_failure_context(state, failure_index, spec, &mut messages);
        }
    }

    let request = CompletionRequest {
        system: Some(spec.system_prompt.clone()),
        messages,
        capabilities: spec.capabilities.clone(),
        options: spec.options.clone(),
    };
    let completion = engine.complete(&request).await?;
    debug!(blocks = completion.content.len(), "generation complete");
    counter!("askdb_generations_total").increment(1);
    state.push(completion.into_message());
    Ok(())
}

/// Re-surface the failed request, its error, and a corrective
/// instruction at the end of the engine's view of the transcript.
fn append_failure_context(
    state: &SessionState,
    failure_index: usize,
    spec: &GenerationSpec<'_>,
    messages: &mut Vec<Message>,
) {
    let failure = state.transcript()[failure_index].clone();
    if let Message::CapabilityResult { request_id, .. } = &failure {
        if let Some(origin) = state.originating_message(request_id) {
            messages.push(origin.clone());
        }
    }
    messages.push(failure);
    messages.push(Message::user(spec.retry_instruction));
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::messages::{AssistantBlock, CapabilityRequest};
    use askdb_core::outcome::CapabilityOutcome;
    use askdb_llm::{Completion, EngineError, EngineResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Engine that records every request and replays scripted replies.
    struct ScriptedEngine {
        requests: Mutex<Vec<CompletionRequest>>,
        replies: Mutex<Vec<Completion>>,
    }

    impl ScriptedEngine {
        fn new(replies: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
            self.requests.lock().push(request.clone());
            self.replies
                .lock()
                .pop()
                .ok_or_else(|| EngineError::EmptyCompletion {
                    message: "script exhausted".to_string(),
                })
        }
    }

    fn spec() -> GenerationSpec<'static> {
        GenerationSpec {
            system_prompt: "analyze".to_string(),
            capabilities: Vec::new(),
            failure_kind: FailureKind::Query,
            retry_instruction: "fix the request",
            give_up_message: "giving up on data retrieval",
            max_retries: 2,
            options: SamplingOptions::default(),
        }
    }

    fn text_completion(text: &str) -> Completion {
        Completion {
            content: vec![AssistantBlock::text(text)],
        }
    }

    #[tokio::test]
    async fn missing_question_is_rejected_before_any_engine_call() {
        let scripted = ScriptedEngine::new(vec![text_completion("unreachable")]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let mut state = SessionState::new("s-1", "");

        let err = generate(&engine, &mut state, &spec()).await.unwrap_err();

        assert!(matches!(err, ControllerError::MissingQuestion));
        assert!(scripted.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_pushes_one_give_up_and_skips_the_engine() {
        let scripted = ScriptedEngine::new(vec![]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let mut state = SessionState::new("s-1", "q");
        state.retry_count = 3;

        generate(&engine, &mut state, &spec()).await.unwrap();

        assert!(scripted.requests.lock().is_empty());
        let last = state.transcript().last().unwrap();
        assert_eq!(last.text(), "giving up on data retrieval");
        assert!(!last.has_capability_requests());
    }

    #[tokio::test]
    async fn failure_context_includes_request_error_and_instruction() {
        let scripted = ScriptedEngine::new(vec![text_completion("retrying")]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::Assistant {
            content: vec![AssistantBlock::CapabilityUse(CapabilityRequest::new(
                "call-1",
                "execute_sql",
                serde_json::Map::new(),
            ))],
        });
        state.push(Message::capability_result(
            "call-1",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "no such column"),
        ));
        state.retry_count = 1;

        generate(&engine, &mut state, &spec()).await.unwrap();

        let requests = scripted.requests.lock();
        let seen = &requests[0].messages;
        // Tail: failed request, failed result, corrective instruction.
        let tail = &seen[seen.len() - 3..];
        assert_eq!(tail[0].capability_requests()[0].id, "call-1");
        assert!(matches!(
            &tail[1],
            Message::CapabilityResult { outcome, .. } if outcome.is_failure()
        ));
        assert_eq!(tail[2].text(), "fix the request");
    }

    #[tokio::test]
    async fn failure_of_another_kind_adds_no_context() {
        let scripted = ScriptedEngine::new(vec![text_completion("ok")]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::capability_result(
            "call-1",
            "run_python",
            CapabilityOutcome::failure(FailureKind::Code, "syntax error"),
        ));

        generate(&engine, &mut state, &spec()).await.unwrap();

        let requests = scripted.requests.lock();
        assert_eq!(requests[0].messages.len(), state.transcript().len() - 1);
    }
}
