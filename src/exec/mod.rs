// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running stage invocations, using
//! `tokio::process::Command`, and reporting their outcome to the chain
//! controller.
//!
//! - [`backend`] provides the `StageExecutor` trait and the production
//!   `ProcessExecutor`; tests replace it with a scripted fake.
//! - [`runner`] spawns one stage process and forwards its output to tracing.
//! - [`setup`] checks the environment preconditions (working dir, virtual
//!   environment, required paths, staging dirs) before any stage runs.

pub mod backend;
pub mod runner;
pub mod setup;

pub use backend::{ProcessExecutor, StageExecutor};
pub use runner::{STAGE_ENV_VAR, run_stage};
pub use setup::{EnvironmentSetup, SetupError, StageEnv};
