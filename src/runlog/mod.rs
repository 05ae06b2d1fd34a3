// src/runlog/mod.rs

//! Append-only run log.
//!
//! Every stage outcome becomes exactly one line:
//!
//! ```text
//! 2026-10-17 09:00:01 - [acquisition] SUCCESS
//! 2026-10-17 09:04:12 - [prepare] FAILED (Error 5)
//! ```
//!
//! The log is a projection of the chain state returned by
//! [`crate::chain::ChainController`]; it is written for operators who
//! `tail`/`grep` it and is never rewritten.

pub mod clock;
pub mod record;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::types::StageOutcome;

pub use clock::{Clock, SystemClock};
pub use record::{LogRecord, SETUP_STAGE, TIMESTAMP_FORMAT};

/// Handle on the shared run log file.
#[derive(Debug)]
pub struct RunLog {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    clock: Arc<dyn Clock>,
    last_timestamp: Option<NaiveDateTime>,
}

impl RunLog {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self::with_clock(fs, path, Arc::new(SystemClock))
    }

    pub fn with_clock(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fs,
            path: path.into(),
            clock,
            last_timestamp: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record for `stage`.
    ///
    /// Creates the log directory if it is missing. Timestamps written through
    /// one handle never go backwards, even if the wall clock does.
    pub fn record(&mut self, stage: &str, outcome: StageOutcome) -> Result<LogRecord> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(dir)
                .with_context(|| format!("creating log directory {:?}", dir))?;
        }

        let now = self.clock.now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let record = LogRecord::new(timestamp, stage, outcome);
        let line = format!("{record}\n");
        self.fs
            .append(&self.path, line.as_bytes())
            .with_context(|| format!("appending to run log {:?}", self.path))?;
        self.last_timestamp = Some(timestamp);

        info!(stage, %outcome, log = ?self.path, "recorded stage outcome");
        Ok(record)
    }

    /// All parseable records, in append order. A missing log is empty.
    pub fn read_records(&self) -> Result<Vec<LogRecord>> {
        if !self.fs.exists(&self.path) {
            return Ok(Vec::new());
        }
        let contents = self
            .fs
            .read_to_string(&self.path)
            .with_context(|| format!("reading run log {:?}", self.path))?;

        let mut records = Vec::new();
        for line in contents.lines() {
            match LogRecord::parse_line(line) {
                Some(record) => records.push(record),
                None if line.trim().is_empty() => {}
                None => debug!(line, "skipping unrecognised run log line"),
            }
        }
        Ok(records)
    }

    /// The last `n` records.
    pub fn tail(&self, n: usize) -> Result<Vec<LogRecord>> {
        let mut records = self.read_records()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::fs::mock::MockFileSystem;

    /// Clock that replays a fixed list of instants.
    #[derive(Debug)]
    struct ReplayClock(Mutex<Vec<NaiveDateTime>>);

    impl Clock for ReplayClock {
        fn now(&self) -> NaiveDateTime {
            let mut times = self.0.lock().unwrap();
            if times.len() > 1 { times.remove(0) } else { times[0] }
        }
    }

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn creates_directory_and_appends_lines() {
        let fs = MockFileSystem::new();
        let clock = Arc::new(ReplayClock(Mutex::new(vec![base()])));
        let mut log = RunLog::with_clock(Arc::new(fs.clone()), "logs/pipeline.log", clock);

        log.record("acquisition", StageOutcome::Success).unwrap();
        log.record("prepare", StageOutcome::Failed(5)).unwrap();

        assert_eq!(
            fs.contents("logs/pipeline.log").unwrap(),
            "2026-10-17 09:00:00 - [acquisition] SUCCESS\n\
             2026-10-17 09:00:00 - [prepare] FAILED (Error 5)\n"
        );
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let fs = MockFileSystem::new();
        let clock = Arc::new(ReplayClock(Mutex::new(vec![
            base(),
            base() - Duration::hours(1),
        ])));
        let mut log = RunLog::with_clock(Arc::new(fs), "run.log", clock);

        let first = log.record("a", StageOutcome::Success).unwrap();
        let second = log.record("b", StageOutcome::Success).unwrap();
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[test]
    fn existing_content_is_preserved_and_tail_reads_back() {
        let fs = MockFileSystem::new();
        fs.add_file("run.log", "operator note\n2026-10-16 08:00:00 - [process] SUCCESS\n");
        let clock = Arc::new(ReplayClock(Mutex::new(vec![base()])));
        let mut log = RunLog::with_clock(Arc::new(fs.clone()), "run.log", clock);

        log.record("acquisition", StageOutcome::Failed(2)).unwrap();

        assert!(fs.contents("run.log").unwrap().starts_with("operator note\n"));
        let records = log.read_records().unwrap();
        assert_eq!(records.len(), 2);
        let last = log.tail(1).unwrap();
        assert_eq!(last[0].stage, "acquisition");
        assert_eq!(last[0].outcome, StageOutcome::Failed(2));
    }

    #[test]
    fn unwritable_log_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_dir("logs");
        fs.deny_writes_under("logs");
        let mut log = RunLog::new(Arc::new(fs), "logs/run.log");
        assert!(log.record("a", StageOutcome::Success).is_err());
    }
}
