// src/exec/backend.rs

//! Pluggable stage executor abstraction.
//!
//! The chain controller talks to a `StageExecutor` instead of spawning
//! processes itself. This makes it easy to swap in a fake executor in tests
//! while keeping the production implementation in [`super::runner`].

use std::future::Future;
use std::pin::Pin;

use crate::chain::plan::StageDescriptor;
use crate::types::StageOutcome;

use super::runner::run_stage;
use super::setup::StageEnv;

/// Trait abstracting how a single stage is executed.
///
/// Implementations must run the stage to completion before resolving; the
/// controller never has two stages in flight.
pub trait StageExecutor: Send {
    fn execute<'a>(
        &'a mut self,
        stage: &'a StageDescriptor,
        env: &'a StageEnv,
    ) -> Pin<Box<dyn Future<Output = StageOutcome> + Send + 'a>>;
}

/// Real executor used in production: one child process per stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl StageExecutor for ProcessExecutor {
    fn execute<'a>(
        &'a mut self,
        stage: &'a StageDescriptor,
        env: &'a StageEnv,
    ) -> Pin<Box<dyn Future<Output = StageOutcome> + Send + 'a>> {
        Box::pin(run_stage(stage, env))
    }
}
