//! Final-answer step: compose the answer from the consolidated
//! material. Always produces non-empty text.

use std::sync::Arc;

use askdb_core::messages::Message;
use askdb_llm::{CompletionRequest, Engine, SamplingOptions};
use tracing::{debug, instrument};

use crate::errors::Result;
use crate::prompts::PromptSet;
use crate::state::SessionState;

/// Fallback when the engine returns only whitespace.
const EMPTY_ANSWER_FALLBACK: &str =
    "I could not produce an answer from the available data.";

/// Ask the engine for the final answer and append it to the transcript.
///
/// The answer call advertises no capabilities; whatever material was
/// consolidated is all it gets. The returned text is never empty.
#[instrument(skip_all, fields(session_id = %state.session_id))]
pub async fn final_answer(
    engine: &Arc<dyn Engine>,
    prompts: &PromptSet,
    state: &mut SessionState,
    options: &SamplingOptions,
) -> Result<String> {
    let question = state.question().unwrap_or_default();
    let prompt = prompts.answer_prompt(
        question,
        state.metadata.as_deref(),
        state.fetched_data.as_deref(),
        state.analysis_output.as_deref(),
    );

    let request = CompletionRequest {
        system: Some(prompts.answer_system.to_string()),
        messages: vec![Message::user(prompt)],
        capabilities: Vec::new(),
        options: options.clone(),
    };
    let completion = engine.complete(&request).await?;
    let mut text = completion.into_message().text();
    if text.trim().is_empty() {
        text = EMPTY_ANSWER_FALLBACK.to_string();
    }
    debug!(chars = text.len(), "final answer composed");
    state.push(Message::assistant_text(text.clone()));
    Ok(text)
}
