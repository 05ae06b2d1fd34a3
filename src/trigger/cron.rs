// src/trigger/cron.rs

//! User crontab backend.
//!
//! Each condition of a trigger becomes two lines: a tag comment naming the
//! trigger and the schedule line itself.
//!
//! ```text
//! # flowchain:Pipeline
//! 0 9 17 * * cd '/srv/pipeline' && flock -n '/tmp/flowchain-Pipeline.lock' '/usr/local/bin/flowchain' '--config' '/srv/pipeline/Flowchain.toml' 'chain'
//! ```
//!
//! Cron has no notion of an instance that is still running, so every command
//! runs under `flock -n` on a per-trigger lock file. A firing that finds the
//! previous instance alive exits at once.
//!
//! Lines not tagged by flowchain are preserved untouched.

use std::fmt::Debug;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use chrono::Timelike;
use tracing::debug;

use super::model::{FireCondition, ScheduledTrigger, TriggerAction};
use super::{DeleteOutcome, SchedulerBackend};

const TAG_PREFIX: &str = "# flowchain:";
const LOCK_DIR: &str = "/tmp";

/// Read/write access to a crontab.
pub trait CrontabStore: Debug {
    fn read(&self) -> Result<String>;
    fn write(&mut self, contents: &str) -> Result<()>;
}

/// The invoking user's crontab, through the `crontab` program.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCrontab;

impl CrontabStore for SystemCrontab {
    fn read(&self) -> Result<String> {
        let output = Command::new("crontab")
            .arg("-l")
            .output()
            .context("running crontab -l")?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            return Ok(String::new());
        }
        bail!("crontab -l failed: {}", stderr.trim())
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        let mut child = Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawning crontab -")?;
        child
            .stdin
            .take()
            .context("crontab stdin not captured")?
            .write_all(contents.as_bytes())
            .context("writing new crontab")?;
        let output = child.wait_with_output().context("waiting for crontab -")?;
        if !output.status.success() {
            bail!(
                "crontab rejected the new table: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Crontab held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCrontab {
    pub contents: String,
}

impl MemoryCrontab {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

impl CrontabStore for MemoryCrontab {
    fn read(&self) -> Result<String> {
        Ok(self.contents.clone())
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        self.contents = contents.to_string();
        Ok(())
    }
}

#[derive(Debug)]
pub struct CronScheduler<S: CrontabStore> {
    store: S,
}

impl<S: CrontabStore> CronScheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn tag_line(name: &str) -> String {
    format!("{TAG_PREFIX}{name}")
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn schedule_expr(condition: &FireCondition) -> String {
    match condition {
        FireCondition::Monthly { day, at } => format!("{} {} {day} * *", at.minute(), at.hour()),
        FireCondition::Daily { at } => format!("{} {} * * *", at.minute(), at.hour()),
        FireCondition::AtStartup => "@reboot".to_string(),
    }
}

/// Lock file guarding the single running instance of trigger `name`.
pub fn instance_lock_path(name: &str) -> String {
    format!("{LOCK_DIR}/flowchain-{name}.lock")
}

fn command_expr(name: &str, action: &TriggerAction) -> String {
    let argv = std::iter::once(&action.program)
        .chain(action.args.iter())
        .map(|part| sh_quote(part))
        .collect::<Vec<_>>()
        .join(" ");
    // `%` is a line terminator inside crontab commands.
    let line = format!(
        "cd {} && flock -n {} {argv}",
        sh_quote(&action.working_dir.to_string_lossy()),
        sh_quote(&instance_lock_path(name))
    );
    line.replace('%', r"\%")
}

/// Crontab lines for `trigger`, tag lines included.
pub fn crontab_entries(trigger: &ScheduledTrigger) -> Vec<String> {
    let command = command_expr(&trigger.name, &trigger.action);
    trigger
        .conditions
        .iter()
        .flat_map(|condition| {
            [
                tag_line(&trigger.name),
                format!("{} {command}", schedule_expr(condition)),
            ]
        })
        .collect()
}

/// Remove every entry tagged `name`. Returns the remaining lines and whether
/// anything was removed.
fn strip_entries(table: &str, name: &str) -> (Vec<String>, bool) {
    let tag = tag_line(name);
    let mut kept = Vec::new();
    let mut removed = false;
    let mut lines = table.lines();
    while let Some(line) = lines.next() {
        if line.trim_end() == tag {
            removed = true;
            // The schedule line belonging to the tag.
            lines.next();
        } else {
            kept.push(line.to_string());
        }
    }
    (kept, removed)
}

fn render(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    }
}

impl<S: CrontabStore> SchedulerBackend for CronScheduler<S> {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn create(&mut self, trigger: &ScheduledTrigger) -> Result<()> {
        if trigger.conditions.is_empty() {
            bail!("trigger '{}' has no fire condition", trigger.name);
        }
        let table = self.store.read()?;
        let (mut lines, existed) = strip_entries(&table, &trigger.name);
        if existed {
            bail!("a trigger named '{}' already exists", trigger.name);
        }
        lines.extend(crontab_entries(trigger));
        debug!(trigger = %trigger.name, "writing crontab");
        self.store.write(&render(&lines))
    }

    fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        let table = self.store.read()?;
        let (lines, removed) = strip_entries(&table, name);
        if !removed {
            return Ok(DeleteOutcome::NotFound);
        }
        self.store.write(&render(&lines))?;
        Ok(DeleteOutcome::Deleted)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let tag = tag_line(name);
        Ok(self.store.read()?.lines().any(|line| line.trim_end() == tag))
    }
}
