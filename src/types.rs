// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical stage name type used throughout the crate.
pub type StageName = String;

/// Outcome of one stage invocation.
///
/// Exit code 0 is the only success; every other code is kept verbatim for
/// diagnostics and for the process exit code of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failed(i32),
}

impl StageOutcome {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            StageOutcome::Success
        } else {
            StageOutcome::Failed(code)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => write!(f, "SUCCESS"),
            StageOutcome::Failed(code) => write!(f, "FAILED (Error {code})"),
        }
    }
}

/// Which OS scheduler the trigger registrar talks to.
///
/// - `Auto`: Windows Task Scheduler on Windows, the user crontab elsewhere.
/// - `Windows`: `schtasks.exe` / `Register-ScheduledTask`.
/// - `Cron`: the current user's crontab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerBackendKind {
    #[default]
    Auto,
    Windows,
    Cron,
}

impl SchedulerBackendKind {
    /// Resolve `Auto` to the concrete backend for the host platform.
    pub fn resolve(self) -> Self {
        match self {
            SchedulerBackendKind::Auto if cfg!(windows) => SchedulerBackendKind::Windows,
            SchedulerBackendKind::Auto => SchedulerBackendKind::Cron,
            other => other,
        }
    }
}

impl FromStr for SchedulerBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SchedulerBackendKind::Auto),
            "windows" => Ok(SchedulerBackendKind::Windows),
            "cron" => Ok(SchedulerBackendKind::Cron),
            other => Err(format!(
                "invalid scheduler backend: {other} (expected \"auto\", \"windows\" or \"cron\")"
            )),
        }
    }
}
