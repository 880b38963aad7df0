//! Phase sequencer - orchestrates the pre/test/post state machine
//!
//! Runs each phase's steps in declared order, decides whether to
//! continue after a failure, and aggregates one overall result plus an
//! ordered list of step results for reporting. Post-phase steps are the
//! designated cleanup points and run even when pre or test failed.

use crate::core::config::{self, ConfigError};
use crate::core::context::RunContext;
use crate::core::step::{Phase, PhaseList, StepDefinition};
use crate::execution::mounts;
use crate::execution::pod::{
    ClientError, FailureReason, PodClient, PodExecutor, StepResult, StepStatus,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// State of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    NotStarted,
    Running,
    Completed { failed: bool },
}

/// The single aggregate error surfaced to the invoking pipeline driver
///
/// Per-step detail lives in the step-result report, not here.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not create shared directory secret {run:?}: {source}")]
    SharedSecret { run: String, source: ClientError },

    #[error("run {run:?} was aborted")]
    Aborted { run: String },

    #[error("run {run:?} failed: steps {steps:?} did not succeed")]
    StepsFailed { run: String, steps: Vec<String> },
}

/// Orchestrates one run of a pre/test/post phase list
pub struct PhaseSequencer<C> {
    client: Arc<C>,
    executor: PodExecutor<C>,
    phases: PhaseList,
    ctx: RunContext,
    states: BTreeMap<Phase, PhaseState>,
    results: Vec<StepResult>,
}

impl<C: PodClient> PhaseSequencer<C> {
    pub fn new(client: Arc<C>, executor: PodExecutor<C>, phases: PhaseList, ctx: RunContext) -> Self {
        let states = BTreeMap::from([
            (Phase::Pre, PhaseState::NotStarted),
            (Phase::Test, PhaseState::NotStarted),
            (Phase::Post, PhaseState::NotStarted),
        ]);
        Self {
            client,
            executor,
            phases,
            ctx,
            states,
            results: Vec::new(),
        }
    }

    /// State of one phase; a skipped phase stays `NotStarted`
    pub fn phase_state(&self, phase: Phase) -> PhaseState {
        self.states[&phase]
    }

    /// Ordered results for every attempted step
    ///
    /// Skipped steps are absent from this list; no pod existed for them.
    pub fn sub_results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }

    /// Execute the whole run
    pub async fn run(
        &mut self,
        abort: Arc<AtomicBool>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), SequencerError> {
        // Configuration errors surface before any pod or secret exists.
        config::validate_bindings(&self.phases, &self.ctx.env)?;

        info!(
            "Starting run {} in namespace {} ({})",
            self.ctx.run_name, self.ctx.namespace, self.ctx.execution_id
        );

        // The shared directory must exist before the first pod is created.
        let secret = mounts::shared_secret(&self.ctx);
        self.client
            .create_secret(&secret)
            .await
            .map_err(|source| SequencerError::SharedSecret {
                run: self.ctx.run_name.clone(),
                source,
            })?;

        let bindings = self.bindings();
        let mut failed: Vec<String> = Vec::new();

        self.run_phase(Phase::Pre, &bindings, &abort, deadline, false, &mut failed)
            .await?;

        if failed.is_empty() {
            self.run_phase(Phase::Test, &bindings, &abort, deadline, false, &mut failed)
                .await?;
        } else {
            info!("Skipping test phase of run {}: pre phase failed", self.ctx.run_name);
        }

        // Optional-on-success skipping only applies when the run allows it,
        // and the decision is made at post entry, from the phases run so
        // far; a failure inside post does not revive steps already deemed
        // skippable.
        let succeeded_so_far = failed.is_empty();
        let skip_optional = self.phases.allow_skip_on_success && succeeded_so_far;
        if skip_optional && self.phases.post.iter().all(|s| s.optional_on_success) {
            if !self.phases.post.is_empty() {
                info!(
                    "Skipping post phase of run {}: run succeeded and all post steps are optional",
                    self.ctx.run_name
                );
            }
        } else {
            self.run_phase(
                Phase::Post,
                &bindings,
                &abort,
                deadline,
                skip_optional,
                &mut failed,
            )
            .await?;
        }

        if !failed.is_empty() {
            return Err(SequencerError::StepsFailed {
                run: self.ctx.run_name.clone(),
                steps: failed,
            });
        }
        info!("Run {} succeeded", self.ctx.run_name);
        Ok(())
    }

    /// Live bindings for parameter resolution: test-level environment,
    /// overridden by the run context
    fn bindings(&self) -> BTreeMap<String, String> {
        let mut bindings = self.phases.environment.clone();
        bindings.extend(self.ctx.env.clone());
        bindings
    }

    async fn run_phase(
        &mut self,
        phase: Phase,
        bindings: &BTreeMap<String, String>,
        abort: &Arc<AtomicBool>,
        deadline: Option<DateTime<Utc>>,
        skip_optional: bool,
        failed: &mut Vec<String>,
    ) -> Result<(), SequencerError> {
        let steps: Vec<StepDefinition> = self.phases.steps(phase).to_vec();
        if steps.is_empty() {
            self.states.insert(phase, PhaseState::Completed { failed: false });
            return Ok(());
        }

        self.states.insert(phase, PhaseState::Running);
        info!("Running {} phase of run {}", phase, self.ctx.run_name);

        let mut phase_failed = false;
        for step in &steps {
            if skip_optional && step.optional_on_success {
                info!(
                    "Skipping optional step {}: every phase so far succeeded",
                    step.name
                );
                continue;
            }
            // Cancellation is a hard stop: no new pods once the flag is set.
            if abort.load(Ordering::SeqCst) {
                self.states.insert(phase, PhaseState::Completed { failed: true });
                return Err(SequencerError::Aborted {
                    run: self.ctx.run_name.clone(),
                });
            }

            let result = self
                .executor
                .run_step(step, &self.ctx, bindings, abort, deadline)
                .await;
            let ok = result.succeeded();
            let aborted = result.status == StepStatus::Failed(FailureReason::Aborted);
            self.results.push(result);

            if aborted {
                self.states.insert(phase, PhaseState::Completed { failed: true });
                return Err(SequencerError::Aborted {
                    run: self.ctx.run_name.clone(),
                });
            }
            if !ok {
                error!(
                    "Step {} of {} phase failed in run {}",
                    step.name, phase, self.ctx.run_name
                );
                failed.push(step.name.clone());
                phase_failed = true;
                // Pre and test short-circuit; post is cleanup and runs on.
                if phase != Phase::Post {
                    break;
                }
            }
        }

        self.states
            .insert(phase, PhaseState::Completed { failed: phase_failed });
        Ok(())
    }
}
