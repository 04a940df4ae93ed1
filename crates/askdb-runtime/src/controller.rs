//! The workflow controller: drives the data-retrieval and
//! post-processing sub-loops from question to final answer.
//!
//! One run owns one [`SessionState`]; the engine and the registry are
//! shared across runs. Steps run strictly sequentially and the run is
//! cancellable between steps, never mid-step.

use std::sync::Arc;

use askdb_capabilities::CapabilityRegistry;
use askdb_core::outcome::FailureKind;
use askdb_llm::{Engine, SamplingOptions};
use askdb_settings::Language;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::answer::final_answer;
use crate::consolidate::consolidate;
use crate::errors::{ControllerError, Result};
use crate::execution::execute_requests;
use crate::gate::evaluate;
use crate::generation::{generate, GenerationSpec};
use crate::prompts::{prompt_set, PromptSet};
use crate::state::SessionState;

/// Capabilities advertised during data retrieval.
const QUERY_CAPABILITIES: &[&str] = &["execute_sql", "fetch_metadata", "similar_queries"];
/// Capabilities advertised during post-processing.
const ANALYSIS_CAPABILITIES: &[&str] = &["run_python"];

/// Tunables for one controller instance.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Consecutive failures tolerated per sub-loop before giving up.
    pub max_retries: u32,
    /// Ceiling on data-retrieval passes when the gate keeps judging
    /// the data insufficient.
    pub max_passes: u32,
    /// Sampling options forwarded on every engine call.
    pub options: SamplingOptions,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_passes: 8,
            options: SamplingOptions::default(),
        }
    }
}

/// The outcome of one run: the answer plus the full session for
/// inspection or persistence.
#[derive(Debug)]
pub struct RunReport {
    /// Final answer text, never empty.
    pub answer: String,
    /// The session as it stood when the answer was composed.
    pub state: SessionState,
}

/// Orchestrates one question from generation to final answer.
pub struct Controller {
    engine: Arc<dyn Engine>,
    registry: Arc<CapabilityRegistry>,
    prompts: &'static PromptSet,
    config: ControllerConfig,
}

impl Controller {
    /// Build a controller over a shared engine and registry.
    #[must_use]
    pub fn new(
        engine: Arc<dyn Engine>,
        registry: Arc<CapabilityRegistry>,
        language: Language,
        config: ControllerConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            prompts: prompt_set(language),
            config,
        }
    }

    /// Run one question to completion.
    ///
    /// The token is checked between steps; a mid-flight engine or
    /// capability call is left to finish (capabilities may observe the
    /// token themselves for interior cancellation).
    #[instrument(skip_all, fields(model = self.engine.model()))]
    pub async fn run(
        &self,
        question: &str,
        cancellation: &CancellationToken,
    ) -> Result<RunReport> {
        let session_id = format!("session-{}", Uuid::now_v7());
        info!(session_id, "starting run");
        let started = std::time::Instant::now();
        let mut state = SessionState::new(session_id, question);

        let run_post_processing = self.data_retrieval(&mut state, cancellation).await?;
        if run_post_processing {
            self.post_processing(&mut state, cancellation).await?;
        }

        self.ensure_live(cancellation)?;
        let answer = final_answer(&self.engine, self.prompts, &mut state, &self.config.options)
            .await?;
        counter!("askdb_runs_total").increment(1);
        histogram!("askdb_run_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            session_id = %state.session_id,
            messages = state.transcript().len(),
            "run complete"
        );
        Ok(RunReport { answer, state })
    }

    /// Data-retrieval sub-loop. Returns `true` when post-processing
    /// should run, `false` when the run should answer directly.
    async fn data_retrieval(
        &self,
        state: &mut SessionState,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        let mut passes = 0u32;
        loop {
            self.ensure_live(cancellation)?;
            passes += 1;
            let spec = self.query_spec(state);
            generate(&self.engine, state, &spec).await?;
            if !last_message_has_requests(state) {
                // Give-up or a plain-text reply: straight to the answer.
                return Ok(false);
            }

            self.ensure_live(cancellation)?;
            execute_requests(&self.registry, state, cancellation).await;
            consolidate(state, FailureKind::Query);

            self.ensure_live(cancellation)?;
            let sufficient =
                evaluate(&self.engine, self.prompts, state, &self.config.options).await?;

            // A sufficient verdict wins even when the latest query
            // failed; post-processing entry resets the failure streak.
            if sufficient {
                return Ok(true);
            }
            if matches!(state.last_failure(), Some((FailureKind::Query, _))) {
                continue;
            }
            if passes >= self.config.max_passes {
                warn!(passes, "pass ceiling reached with insufficient data");
                counter!("askdb_pass_ceiling_hits_total").increment(1);
                return Ok(false);
            }
        }
    }

    /// Post-processing sub-loop: analysis generation scoped to
    /// `run_python`, with its own failure streak.
    async fn post_processing(
        &self,
        state: &mut SessionState,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        state.retry_count = 0;
        loop {
            self.ensure_live(cancellation)?;
            let spec = self.analysis_spec(state);
            generate(&self.engine, state, &spec).await?;
            if !last_message_has_requests(state) {
                // Skipped analysis or give-up.
                return Ok(());
            }

            self.ensure_live(cancellation)?;
            execute_requests(&self.registry, state, cancellation).await;
            consolidate(state, FailureKind::Code);

            match state.last_failure() {
                Some((FailureKind::Code, _)) => continue,
                _ => return Ok(()),
            }
        }
    }

    fn query_spec(&self, state: &SessionState) -> GenerationSpec<'_> {
        GenerationSpec {
            system_prompt: self
                .prompts
                .query_prompt(state.metadata.as_deref(), state.fetched_data.as_deref()),
            capabilities: self.registry.descriptors_for(QUERY_CAPABILITIES),
            failure_kind: FailureKind::Query,
            retry_instruction: self.prompts.retry_instruction,
            give_up_message: self.prompts.give_up_data,
            max_retries: self.config.max_retries,
            options: self.config.options.clone(),
        }
    }

    fn analysis_spec(&self, state: &SessionState) -> GenerationSpec<'_> {
        GenerationSpec {
            system_prompt: self.prompts.analysis_prompt(state.fetched_data.as_deref()),
            capabilities: self.registry.descriptors_for(ANALYSIS_CAPABILITIES),
            failure_kind: FailureKind::Code,
            retry_instruction: self.prompts.retry_instruction,
            give_up_message: self.prompts.give_up_analysis,
            max_retries: self.config.max_retries,
            options: self.config.options.clone(),
        }
    }

    fn ensure_live(&self, cancellation: &CancellationToken) -> Result<()> {
        if cancellation.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }
        Ok(())
    }
}

fn last_message_has_requests(state: &SessionState) -> bool {
    state
        .transcript()
        .last()
        .is_some_and(askdb_core::messages::Message::has_capability_requests)
}
