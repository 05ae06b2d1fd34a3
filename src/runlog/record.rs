// src/runlog/record.rs

//! One line of the run log.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::types::{StageName, StageOutcome};

/// `strftime` layout of the timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stage name used for environment precondition failures.
pub const SETUP_STAGE: &str = "setup";

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) - \[([^\]]+)\] (?:SUCCESS|FAILED \(Error (-?\d+)\))\s*$",
    )
    .expect("valid log line regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub stage: StageName,
    pub outcome: StageOutcome,
}

impl LogRecord {
    pub fn new(timestamp: NaiveDateTime, stage: impl Into<StageName>, outcome: StageOutcome) -> Self {
        Self {
            timestamp,
            stage: stage.into(),
            outcome,
        }
    }

    /// Parse one line written by [`fmt::Display`]; `None` for anything else.
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = LINE_RE.captures(line)?;
        let timestamp = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
        let outcome = match caps.get(3) {
            Some(code) => StageOutcome::Failed(code.as_str().parse().ok()?),
            None => StageOutcome::Success,
        };
        Some(Self::new(timestamp, &caps[2], outcome))
    }
}

/// `2026-10-17 09:00:04 - [prepare] FAILED (Error 5)`
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.stage,
            self.outcome
        )
    }
}
