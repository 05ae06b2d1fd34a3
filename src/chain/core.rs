// src/chain/core.rs

//! Pure chain state machine.
//!
//! `ChainCore` consumes stage outcomes and tells the IO shell
//! ([`super::controller::ChainController`]) what to do next. It has no
//! channels, no Tokio types, and performs no IO, so every transition can be
//! unit tested directly.
//!
//! States per stage: `Pending -> Running -> {Succeeded, Failed}`. Only the
//! stage at the cursor is ever `Running`; a failure ends the chain and the
//! remaining stages stay `Pending`.

use tracing::{debug, warn};

use crate::chain::plan::{ChainPlan, StageDescriptor};
use crate::types::{StageName, StageOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed(i32),
}

/// Final result of one chain instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Succeeded,
    StageFailed { stage: StageName, code: i32 },
    /// Environment preconditions failed; no stage was attempted.
    SetupFailed(String),
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChainOutcome::Succeeded)
    }

    /// Process exit code: 0, the failing stage's own code, or 1 for setup.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChainOutcome::Succeeded => 0,
            // A stage can only fail with a nonzero code, but never map a
            // failure to 0.
            ChainOutcome::StageFailed { code: 0, .. } => 1,
            ChainOutcome::StageFailed { code, .. } => *code,
            ChainOutcome::SetupFailed(_) => 1,
        }
    }
}

/// What the shell should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// Run this stage and report its outcome back.
    Dispatch(StageDescriptor),
    /// The chain is over.
    Finished(ChainOutcome),
}

/// Snapshot handed back to the caller when a chain run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub stages: Vec<(StageName, StageState)>,
    pub outcome: ChainOutcome,
}

impl ChainReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn state_of(&self, stage: &str) -> Option<StageState> {
        self.stages
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, state)| *state)
    }

    /// Stages that were actually started, in order.
    pub fn attempted(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|(_, state)| !matches!(state, StageState::Pending))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug)]
pub struct ChainCore {
    plan: ChainPlan,
    states: Vec<StageState>,
    cursor: usize,
    outcome: Option<ChainOutcome>,
}

impl ChainCore {
    pub fn new(plan: ChainPlan) -> Self {
        let states = vec![StageState::Pending; plan.len()];
        Self {
            plan,
            states,
            cursor: 0,
            outcome: None,
        }
    }

    pub fn plan(&self) -> &ChainPlan {
        &self.plan
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&ChainOutcome> {
        self.outcome.as_ref()
    }

    pub fn state_of(&self, stage: &str) -> Option<StageState> {
        self.plan.position(stage).map(|idx| self.states[idx])
    }

    /// Begin the chain: dispatch the first stage.
    ///
    /// An empty plan finishes successfully straight away.
    pub fn start(&mut self) -> ChainStep {
        if let Some(ref outcome) = self.outcome {
            return ChainStep::Finished(outcome.clone());
        }
        if self.states.iter().any(|s| *s != StageState::Pending) {
            warn!("start() called on a chain that is already running");
            return self.current_step();
        }
        self.dispatch(0)
    }

    /// Feed back the outcome of the currently running stage.
    pub fn on_stage_finished(&mut self, outcome: StageOutcome) -> ChainStep {
        if self.outcome.is_some() || self.states.get(self.cursor) != Some(&StageState::Running) {
            warn!(?outcome, "stage outcome reported while no stage is running; ignoring");
            return self.current_step();
        }

        let idx = self.cursor;
        match outcome {
            StageOutcome::Success => {
                self.states[idx] = StageState::Succeeded;
                debug!(stage = %self.plan.stages()[idx].name, "stage succeeded");
                self.dispatch(idx + 1)
            }
            StageOutcome::Failed(code) => {
                self.states[idx] = StageState::Failed(code);
                let stage = self.plan.stages()[idx].name.clone();
                debug!(%stage, code, "stage failed; halting chain");
                self.finish(ChainOutcome::StageFailed { stage, code })
            }
        }
    }

    /// Environment setup failed before the first stage: end the chain
    /// without attempting anything.
    pub fn abort_setup(&mut self, reason: impl Into<String>) -> ChainStep {
        if self.states.iter().any(|s| *s != StageState::Pending) {
            warn!("setup failure reported after stages started; ignoring");
            return self.current_step();
        }
        self.finish(ChainOutcome::SetupFailed(reason.into()))
    }

    pub fn report(&self) -> ChainReport {
        ChainReport {
            stages: self
                .plan
                .stages()
                .iter()
                .zip(self.states.iter())
                .map(|(stage, state)| (stage.name.clone(), *state))
                .collect(),
            outcome: self
                .outcome
                .clone()
                .unwrap_or_else(|| ChainOutcome::SetupFailed("chain did not finish".to_string())),
        }
    }

    fn dispatch(&mut self, idx: usize) -> ChainStep {
        match self.plan.stages().get(idx) {
            Some(stage) => {
                self.cursor = idx;
                self.states[idx] = StageState::Running;
                ChainStep::Dispatch(stage.clone())
            }
            None => self.finish(ChainOutcome::Succeeded),
        }
    }

    fn finish(&mut self, outcome: ChainOutcome) -> ChainStep {
        self.outcome = Some(outcome.clone());
        ChainStep::Finished(outcome)
    }

    fn current_step(&self) -> ChainStep {
        match self.outcome {
            Some(ref outcome) => ChainStep::Finished(outcome.clone()),
            None => match self.states.get(self.cursor) {
                Some(StageState::Running) => {
                    ChainStep::Dispatch(self.plan.stages()[self.cursor].clone())
                }
                _ => ChainStep::Finished(ChainOutcome::SetupFailed(
                    "chain was never started".to_string(),
                )),
            },
        }
    }
}
