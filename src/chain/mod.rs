// src/chain/mod.rs

//! Stage chain execution.
//!
//! - [`plan`] turns config into an ordered [`ChainPlan`] and derives the
//!   sub-chains for `--from` and manual stage runs.
//! - [`core`] is the pure state machine deciding what runs next.
//! - [`controller`] is the async shell that executes stages and writes the
//!   run log.

pub mod controller;
pub mod core;
pub mod plan;

pub use controller::ChainController;
pub use core::{ChainCore, ChainOutcome, ChainReport, ChainStep, StageState};
pub use plan::{ChainPlan, Invocation, StageDescriptor};
