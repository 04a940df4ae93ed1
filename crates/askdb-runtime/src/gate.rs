//! Sufficiency gate: ask the engine whether the fetched data can
//! answer the question, and parse the verdict fail-closed.

use std::sync::Arc;

use askdb_core::messages::Message;
use askdb_llm::{CompletionRequest, Engine, SamplingOptions};
use metrics::counter;
use tracing::{debug, instrument};

use crate::errors::Result;
use crate::prompts::PromptSet;
use crate::state::SessionState;

/// Verdict phrase meaning the fetched data suffices.
pub const SUFFICIENT_PHRASE: &str = "DATA IS EXHAUSTIVE";
/// Verdict phrase meaning more data is needed.
pub const INSUFFICIENT_PHRASE: &str = "MISSING DATA";

/// Run the gate and record the verdict on the session.
///
/// The gate evaluation never sees capabilities and never touches the
/// transcript; it is a side judgment on the consolidated data. An
/// ambiguous or malformed reply counts as insufficient. Only transport
/// failures are errors.
#[instrument(skip_all, fields(session_id = %state.session_id))]
pub async fn evaluate(
    engine: &Arc<dyn Engine>,
    prompts: &PromptSet,
    state: &mut SessionState,
    options: &SamplingOptions,
) -> Result<bool> {
    let question = state.question().unwrap_or_default();
    let prompt = prompts.gate_prompt(
        question,
        state.metadata.as_deref(),
        state.fetched_data.as_deref(),
    );

    let request = CompletionRequest {
        system: Some(prompts.gate_system.to_string()),
        messages: vec![Message::user(prompt)],
        capabilities: Vec::new(),
        options: options.clone(),
    };
    let completion = engine.complete(&request).await?;
    let verdict = parse_verdict(&completion.into_message().text());
    debug!(sufficient = verdict, "gate verdict");
    counter!(
        "askdb_gate_verdicts_total",
        "verdict" => if verdict { "sufficient" } else { "insufficient" },
    )
    .increment(1);
    state.sufficient_context = Some(verdict);
    Ok(verdict)
}

/// Case-insensitive containment check; anything that does not contain
/// the sufficient phrase is insufficient.
fn parse_verdict(reply: &str) -> bool {
    reply.to_uppercase().contains(SUFFICIENT_PHRASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::prompt_set;
    use askdb_core::messages::AssistantBlock;
    use askdb_llm::{Completion, EngineResult};
    use askdb_settings::Language;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Verdict {
        reply: &'static str,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl Engine for Verdict {
        fn model(&self) -> &str {
            "verdict"
        }

        async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
            *self.last_request.lock() = Some(request.clone());
            Ok(Completion {
                content: vec![AssistantBlock::text(self.reply)],
            })
        }
    }

    #[tokio::test]
    async fn prompt_carries_question_metadata_and_data() {
        let verdict = std::sync::Arc::new(Verdict {
            reply: "DATA IS EXHAUSTIVE",
            last_request: Mutex::new(None),
        });
        let engine: Arc<dyn Engine> = verdict.clone();
        let mut state = SessionState::new("s-1", "how many orders?");
        state.metadata = Some("orders: [id]".to_string());
        state.fetched_data = Some("count\n42".to_string());

        let sufficient = evaluate(
            &engine,
            prompt_set(Language::En),
            &mut state,
            &SamplingOptions::default(),
        )
        .await
        .unwrap();

        assert!(sufficient);
        assert_eq!(state.sufficient_context, Some(true));
        let request = verdict.last_request.lock().clone().unwrap();
        let prompt = request.messages[0].text();
        assert!(prompt.contains("how many orders?"));
        assert!(prompt.contains("orders: [id]"));
        assert!(prompt.contains("count\n42"));
        assert!(request.capabilities.is_empty());
    }

    #[test]
    fn exact_phrase_is_sufficient() {
        assert!(parse_verdict("DATA IS EXHAUSTIVE"));
    }

    #[test]
    fn containment_and_case_are_tolerated() {
        assert!(parse_verdict("I believe the data is exhaustive for this question."));
        assert!(parse_verdict("Verdict: Data Is Exhaustive."));
    }

    #[test]
    fn missing_data_is_insufficient() {
        assert!(!parse_verdict("MISSING DATA"));
        assert!(!parse_verdict("missing data: no revenue column"));
    }

    #[test]
    fn ambiguity_fails_closed() {
        assert!(!parse_verdict(""));
        assert!(!parse_verdict("the data looks fine to me"));
        assert!(!parse_verdict("EXHAUSTIVE? hardly"));
    }
}
