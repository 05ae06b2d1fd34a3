// src/trigger/mod.rs

//! Registration of triggers with the operating system's scheduler.
//!
//! The registrar only needs three capabilities from a scheduler (create,
//! delete, exists), captured by [`SchedulerBackend`]. Concrete backends:
//!
//! - [`windows::WindowsTaskScheduler`]: `schtasks.exe` / PowerShell.
//! - [`cron::CronScheduler`]: the current user's crontab.
//! - [`memory::MemoryScheduler`]: in-process, for tests.

pub mod cron;
pub mod memory;
pub mod model;
pub mod registrar;
pub mod windows;

use std::fmt::Debug;

use anyhow::Result;

use crate::types::SchedulerBackendKind;

pub use cron::{CronScheduler, CrontabStore, MemoryCrontab, SystemCrontab};
pub use memory::MemoryScheduler;
pub use model::{
    FireCondition, ScheduledTrigger, TriggerAction, TriggerContext, triggers_from_config,
};
pub use registrar::TriggerRegistrar;
pub use windows::{CommandRunner, SystemCommandRunner, WindowsTaskScheduler};

/// Result of deleting a trigger by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub trait SchedulerBackend: Debug {
    fn name(&self) -> &'static str;

    /// Create the trigger. Fails if a trigger with the same name exists and
    /// the backend cannot overwrite it.
    fn create(&mut self, trigger: &ScheduledTrigger) -> Result<()>;

    fn delete(&mut self, name: &str) -> Result<DeleteOutcome>;

    fn exists(&self, name: &str) -> Result<bool>;
}

impl SchedulerBackend for Box<dyn SchedulerBackend> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn create(&mut self, trigger: &ScheduledTrigger) -> Result<()> {
        (**self).create(trigger)
    }

    fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        (**self).delete(name)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        (**self).exists(name)
    }
}

/// The production backend for `kind` (after resolving `Auto`).
pub fn system_backend(kind: SchedulerBackendKind) -> Box<dyn SchedulerBackend> {
    match kind.resolve() {
        SchedulerBackendKind::Windows => Box::new(WindowsTaskScheduler::new(SystemCommandRunner)),
        _ => Box::new(CronScheduler::new(SystemCrontab)),
    }
}
