// src/chain/controller.rs

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::exec::setup::EnvironmentSetup;
use crate::exec::StageExecutor;
use crate::runlog::{RunLog, SETUP_STAGE};
use crate::types::StageOutcome;

use super::core::{ChainCore, ChainReport, ChainStep};
use super::plan::ChainPlan;

/// Runs one chain instance to completion.
///
/// This is the IO shell around [`ChainCore`]: it checks the environment,
/// hands dispatched stages to a [`StageExecutor`] one at a time, and appends
/// every outcome to the [`RunLog`] before the next stage may start.
pub struct ChainController<E: StageExecutor> {
    executor: E,
    log: RunLog,
    setup: EnvironmentSetup,
}

impl<E: StageExecutor> fmt::Debug for ChainController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainController")
            .field("log", &self.log)
            .field("setup", &self.setup)
            .finish_non_exhaustive()
    }
}

impl<E: StageExecutor> ChainController<E> {
    pub fn new(executor: E, log: RunLog, setup: EnvironmentSetup) -> Self {
        Self {
            executor,
            log,
            setup,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub async fn run(&mut self, plan: ChainPlan) -> Result<ChainReport> {
        self.run_with_vars(plan, BTreeMap::new()).await
    }

    /// Run `plan`, exporting `extra` to every stage on top of the
    /// environment's own variables.
    ///
    /// Stage failures and setup failures are reported through the returned
    /// [`ChainReport`]; `Err` means the run log itself could not be written.
    pub async fn run_with_vars(
        &mut self,
        plan: ChainPlan,
        extra: BTreeMap<String, String>,
    ) -> Result<ChainReport> {
        info!(stages = ?plan.stage_names(), "starting chain");
        let mut core = ChainCore::new(plan);

        let mut env = match self.setup.prepare().await {
            Ok(env) => env,
            Err(err) => {
                error!(error = %err, "environment setup failed; no stage will run");
                self.log.record(SETUP_STAGE, StageOutcome::Failed(1))?;
                core.abort_setup(err.to_string());
                return Ok(core.report());
            }
        };
        env.vars.extend(extra);

        let mut step = core.start();
        loop {
            match step {
                ChainStep::Dispatch(stage) => {
                    debug!(stage = %stage.name, "dispatching stage");
                    let outcome = self.executor.execute(&stage, &env).await;
                    if let StageOutcome::Failed(code) = outcome {
                        warn!(stage = %stage.name, code, "stage failed");
                    }
                    self.log.record(&stage.name, outcome)?;
                    step = core.on_stage_finished(outcome);
                }
                ChainStep::Finished(outcome) => {
                    info!(?outcome, exit_code = outcome.exit_code(), "chain finished");
                    break;
                }
            }
        }

        Ok(core.report())
    }
}
