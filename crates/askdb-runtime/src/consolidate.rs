//! Consolidation step: fold the latest capability results into the
//! session's derived scalars and update the failure streak.

use askdb_core::outcome::{CapabilityOutcome, FailureKind};
use tracing::{debug, instrument};

use crate::state::SessionState;

/// Fold the transcript into the derived scalars.
///
/// Latest-wins per capability: a newer `execute_sql` success replaces
/// `fetched_data` wholesale, and likewise for `fetch_metadata` and
/// `run_python`. The retry streak counts consecutive failures of
/// `scope` only; any other tail resets it. Re-running on an unchanged
/// transcript is a no-op.
#[instrument(skip_all, fields(session_id = %state.session_id, scope = ?scope))]
pub fn consolidate(state: &mut SessionState, scope: FailureKind) {
    if !state.needs_consolidation() {
        return;
    }

    if let Some(rendered) = latest_success(state, "fetch_metadata") {
        state.metadata = Some(rendered);
    }
    if let Some(rendered) = latest_success(state, "execute_sql") {
        state.fetched_data = Some(rendered);
    }
    if let Some(rendered) = latest_success(state, "run_python") {
        state.analysis_output = Some(rendered);
    }

    match state.last_failure() {
        Some((kind, _)) if kind == scope => state.retry_count += 1,
        _ => state.retry_count = 0,
    }
    debug!(retry_count = state.retry_count, "consolidated");
    state.mark_consolidated();
}

fn latest_success(state: &SessionState, capability: &str) -> Option<String> {
    match state.latest_result(capability)? {
        CapabilityOutcome::Success(payload) => Some(payload.render()),
        CapabilityOutcome::Failure { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::messages::Message;
    use askdb_core::outcome::CapabilityPayload;

    fn table_result(id: &str, label: &str, value: &str) -> Message {
        Message::capability_result(
            id,
            "execute_sql",
            CapabilityOutcome::Success(CapabilityPayload::Table {
                label: label.to_string(),
                columns: vec!["n".to_string()],
                rows: vec![vec![value.to_string()]],
            }),
        )
    }

    #[test]
    fn latest_success_replaces_earlier_data() {
        let mut state = SessionState::new("s-1", "q");
        state.push(table_result("r1", "first", "1"));
        consolidate(&mut state, FailureKind::Query);
        let first = state.fetched_data.clone().unwrap();

        state.push(table_result("r2", "second", "2"));
        consolidate(&mut state, FailureKind::Query);
        let second = state.fetched_data.clone().unwrap();

        assert_ne!(first, second);
        assert!(second.contains("second"));
    }

    #[test]
    fn failure_of_scope_kind_increments_the_streak() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::capability_result(
            "r1",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "bad column"),
        ));
        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 1);

        state.push(Message::capability_result(
            "r2",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "still bad"),
        ));
        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 2);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut state = SessionState::new("s-1", "q");
        state.retry_count = 2;
        state.push(table_result("r1", "t", "1"));
        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn out_of_scope_failure_resets_the_streak() {
        let mut state = SessionState::new("s-1", "q");
        state.retry_count = 1;
        state.push(Message::capability_result(
            "r1",
            "run_python",
            CapabilityOutcome::failure(FailureKind::Code, "syntax error"),
        ));
        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn unchanged_transcript_is_a_no_op() {
        let mut state = SessionState::new("s-1", "q");
        state.push(Message::capability_result(
            "r1",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "bad column"),
        ));
        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 1);

        consolidate(&mut state, FailureKind::Query);
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn failed_query_keeps_previous_data() {
        let mut state = SessionState::new("s-1", "q");
        state.push(table_result("r1", "good", "1"));
        consolidate(&mut state, FailureKind::Query);

        state.push(Message::capability_result(
            "r2",
            "execute_sql",
            CapabilityOutcome::failure(FailureKind::Query, "bad column"),
        ));
        consolidate(&mut state, FailureKind::Query);

        assert!(state.fetched_data.as_deref().unwrap().contains("good"));
    }
}
