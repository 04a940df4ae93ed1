//! Session state: the message transcript plus the consolidated scalars
//! the controller branches on.
//!
//! The transcript is append-only. Side tables (`latest`, `origins`) are
//! maintained on push so lookups never rescan the whole transcript.

use std::collections::HashMap;

use askdb_core::messages::{CapabilityRequest, Message};
use askdb_core::outcome::{CapabilityOutcome, FailureKind};

/// All mutable state for one controller run.
#[derive(Debug)]
pub struct SessionState {
    /// Stable identifier for this run, used in logs and invocation contexts.
    pub session_id: String,
    transcript: Vec<Message>,
    /// Capability name → transcript index of its latest result.
    latest: HashMap<String, usize>,
    /// Request id → transcript index of the assistant message that issued it.
    origins: HashMap<String, usize>,
    /// Transcript length as of the last consolidation pass.
    consolidated_through: usize,
    /// Latest successful metadata fetch, rendered.
    pub metadata: Option<String>,
    /// Latest successful warehouse query result, rendered.
    pub fetched_data: Option<String>,
    /// Latest successful script output, rendered.
    pub analysis_output: Option<String>,
    /// Consecutive failures of the current sub-loop's kind.
    pub retry_count: u32,
    /// Latest sufficiency verdict, if the gate has run.
    pub sufficient_context: Option<bool>,
}

impl SessionState {
    /// Start a fresh session seeded with the user's question.
    ///
    /// A blank question seeds nothing, leaving the transcript without a
    /// user message; generation rejects such a session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, question: &str) -> Self {
        let mut state = Self {
            session_id: session_id.into(),
            transcript: Vec::new(),
            latest: HashMap::new(),
            origins: HashMap::new(),
            consolidated_through: 0,
            metadata: None,
            fetched_data: None,
            analysis_output: None,
            retry_count: 0,
            sufficient_context: None,
        };
        if !question.trim().is_empty() {
            state.push(Message::user(question));
        }
        state
    }

    /// Append a message, maintaining the side tables.
    pub fn push(&mut self, message: Message) {
        let index = self.transcript.len();
        match &message {
            Message::Assistant { .. } => {
                for request in message.capability_requests() {
                    let _ = self.origins.insert(request.id.clone(), index);
                }
            }
            Message::CapabilityResult { capability, .. } => {
                let _ = self.latest.insert(capability.clone(), index);
            }
            Message::User { .. } => {}
        }
        self.transcript.push(message);
    }

    /// The full transcript, oldest first.
    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// The first user message, i.e. the question under analysis.
    #[must_use]
    pub fn question(&self) -> Option<&str> {
        self.transcript.iter().find_map(|message| match message {
            Message::User { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// The latest result for a capability, regardless of position.
    #[must_use]
    pub fn latest_result(&self, capability: &str) -> Option<&CapabilityOutcome> {
        let index = *self.latest.get(capability)?;
        match &self.transcript[index] {
            Message::CapabilityResult { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Capability requests carried by the most recent assistant message.
    #[must_use]
    pub fn last_assistant_requests(&self) -> Vec<CapabilityRequest> {
        self.transcript
            .iter()
            .rev()
            .find(|message| matches!(message, Message::Assistant { .. }))
            .map(|message| message.capability_requests().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// If the last message is a capability failure, its kind and the
    /// transcript index of the result.
    #[must_use]
    pub fn last_failure(&self) -> Option<(FailureKind, usize)> {
        let index = self.transcript.len().checked_sub(1)?;
        match &self.transcript[index] {
            Message::CapabilityResult {
                outcome: CapabilityOutcome::Failure { kind, .. },
                ..
            } => Some((*kind, index)),
            _ => None,
        }
    }

    /// The assistant message that issued the given request, if tracked.
    #[must_use]
    pub fn originating_message(&self, request_id: &str) -> Option<&Message> {
        let index = *self.origins.get(request_id)?;
        self.transcript.get(index)
    }

    /// Whether the transcript changed since the last consolidation.
    #[must_use]
    pub fn needs_consolidation(&self) -> bool {
        self.consolidated_through < self.transcript.len()
    }

    /// Record that consolidation has seen the whole transcript.
    pub fn mark_consolidated(&mut self) {
        self.consolidated_through = self.transcript.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::messages::AssistantBlock;
    use askdb_core::outcome::CapabilityPayload;

    fn request(id: &str, name: &str) -> CapabilityRequest {
        CapabilityRequest::new(id, name, serde_json::Map::new())
    }

    fn table(label: &str) -> CapabilityOutcome {
        CapabilityOutcome::Success(CapabilityPayload::Table {
            label: label.to_string(),
            columns: vec!["n".to_string()],
            rows: vec![vec!["1".to_string()]],
        })
    }

    #[test]
    fn question_is_first_user_message() {
        let state = SessionState::new("s-1", "how many orders?");
        assert_eq!(state.question(), Some("how many orders?"));
    }

    #[test]
    fn blank_question_seeds_no_user_message() {
        let state = SessionState::new("s-1", "   ");
        assert_eq!(state.question(), None);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn latest_result_tracks_per_capability() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::capability_result("r1", "execute_sql", table("first")));
        state.push(Message::capability_result(
            "r2",
            "fetch_metadata",
            CapabilityOutcome::Success(CapabilityPayload::Metadata {
                text: "orders: [id]".to_string(),
            }),
        ));
        state.push(Message::capability_result("r3", "execute_sql", table("second")));

        let latest = state.latest_result("execute_sql").unwrap();
        match latest {
            CapabilityOutcome::Success(CapabilityPayload::Table { label, .. }) => {
                assert_eq!(label, "second");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Another capability's result is never returned in its place.
        assert!(matches!(
            state.latest_result("fetch_metadata").unwrap(),
            CapabilityOutcome::Success(CapabilityPayload::Metadata { .. })
        ));
        assert!(state.latest_result("run_python").is_none());
    }

    #[test]
    fn last_failure_only_inspects_the_tail() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::capability_result(
            "r1",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "bad column"),
        ));
        assert_eq!(state.last_failure().map(|(kind, _)| kind), Some(FailureKind::Query));

        state.push(Message::capability_result("r2", "execute_sql", table("t")));
        assert!(state.last_failure().is_none());
    }

    #[test]
    fn originating_message_resolves_request_ids() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::Assistant {
            content: vec![AssistantBlock::CapabilityUse(request("call-9", "execute_sql"))],
        });
        let origin = state.originating_message("call-9").unwrap();
        assert_eq!(origin.capability_requests()[0].id, "call-9");
        assert!(state.originating_message("call-0").is_none());
    }

    #[test]
    fn last_assistant_requests_skips_results() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::Assistant {
            content: vec![AssistantBlock::CapabilityUse(request("call-1", "execute_sql"))],
        });
        state.push(Message::capability_result("call-1", "execute_sql", table("t")));
        let requests = state.last_assistant_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "execute_sql");
    }

    #[test]
    fn consolidation_watermark_tracks_transcript_growth() {
        let mut state = SessionState::new("s-1", "q");
        assert!(state.needs_consolidation());
        state.mark_consolidated();
        assert!(!state.needs_consolidation());
        state.push(Message::user("more"));
        assert!(state.needs_consolidation());
    }
}
