// src/trigger/model.rs

//! OS-level trigger descriptions, independent of any scheduler backend.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;

use crate::chain::plan::Invocation;
use crate::config::model::{ConfigFile, TriggerConfig, TriggerKind};
use crate::config::parse_clock_time;
use crate::errors::{FlowchainError, Result};

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireCondition {
    /// Once a month on `day` at `at` (local time).
    Monthly { day: u32, at: NaiveTime },
    /// Every day at `at`.
    Daily { at: NaiveTime },
    /// When the machine boots.
    AtStartup,
}

impl fmt::Display for FireCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FireCondition::Monthly { day, at } => {
                write!(f, "monthly on day {day} at {}", at.format("%H:%M"))
            }
            FireCondition::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
            FireCondition::AtStartup => write!(f, "at startup"),
        }
    }
}

/// The program the OS scheduler launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerAction {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl TriggerAction {
    /// Single command line with whitespace-bearing parts double-quoted, as
    /// `schtasks /TR` expects it.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote_windows(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_windows(part: &str) -> String {
    if part.is_empty() || part.contains(char::is_whitespace) {
        format!("\"{}\"", part.replace('"', "\\\""))
    } else {
        part.to_string()
    }
}

/// A named trigger as handed to a [`super::SchedulerBackend`].
///
/// The name is the unique key in the OS scheduler; registering the same name
/// twice replaces the first registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub name: String,
    pub conditions: Vec<FireCondition>,
    pub action: TriggerAction,
}

impl ScheduledTrigger {
    pub fn monthly(
        name: impl Into<String>,
        day: u32,
        at: NaiveTime,
        action: TriggerAction,
    ) -> Self {
        Self {
            name: name.into(),
            conditions: vec![FireCondition::Monthly { day, at }],
            action,
        }
    }

    /// Keep a long-running worker alive: start it at boot and once a day.
    pub fn keepalive(
        name: impl Into<String>,
        on_boot: bool,
        daily_at: Option<NaiveTime>,
        action: TriggerAction,
    ) -> Self {
        let mut conditions = Vec::new();
        if on_boot {
            conditions.push(FireCondition::AtStartup);
        }
        if let Some(at) = daily_at {
            conditions.push(FireCondition::Daily { at });
        }
        Self {
            name: name.into(),
            conditions,
            action,
        }
    }

    /// Build the trigger for `[trigger.<name>]`.
    pub fn from_config(name: &str, cfg: &TriggerConfig, ctx: &TriggerContext) -> Result<Self> {
        let at = match cfg.at {
            Some(ref raw) => Some(parse_clock_time(raw).ok_or_else(|| {
                FlowchainError::ConfigError(format!(
                    "trigger '{name}': invalid time '{raw}', expected HH:MM"
                ))
            })?),
            None => None,
        };

        match cfg.kind {
            TriggerKind::Monthly => {
                let day = cfg.day.ok_or_else(|| {
                    FlowchainError::ConfigError(format!("trigger '{name}': monthly needs `day`"))
                })?;
                let at = at.ok_or_else(|| {
                    FlowchainError::ConfigError(format!("trigger '{name}': monthly needs `at`"))
                })?;
                Ok(Self::monthly(name, day, at, ctx.chain_action(cfg.from.as_deref())))
            }
            TriggerKind::Keepalive => {
                let cmd = cfg.cmd.as_deref().ok_or_else(|| {
                    FlowchainError::ConfigError(format!("trigger '{name}': keepalive needs `cmd`"))
                })?;
                let (program, args) = Invocation::from_parts(cmd, cfg.args.as_deref()).argv();
                let action = TriggerAction {
                    program,
                    args,
                    working_dir: ctx.working_dir.clone(),
                };
                Ok(Self::keepalive(name, cfg.effective_on_boot(), at, action))
            }
        }
    }
}

/// Where the registered triggers point back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
    /// flowchain executable.
    pub program: PathBuf,
    /// Absolute path of the config file the chain trigger passes along.
    pub config_path: PathBuf,
    pub working_dir: PathBuf,
}

impl TriggerContext {
    pub fn new(
        program: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            config_path: config_path.into(),
            working_dir: working_dir.into(),
        }
    }

    /// `flowchain --config <path> chain [--from <stage>]`.
    pub fn chain_action(&self, from: Option<&str>) -> TriggerAction {
        let mut args = vec![
            "--config".to_string(),
            path_arg(&self.config_path),
            "chain".to_string(),
        ];
        if let Some(stage) = from {
            args.push("--from".to_string());
            args.push(stage.to_string());
        }
        TriggerAction {
            program: path_arg(&self.program),
            args,
            working_dir: self.working_dir.clone(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Every `[trigger.*]` in `cfg`, in name order.
pub fn triggers_from_config(cfg: &ConfigFile, ctx: &TriggerContext) -> Result<Vec<ScheduledTrigger>> {
    cfg.trigger
        .iter()
        .map(|(name, trigger)| ScheduledTrigger::from_config(name, trigger, ctx))
        .collect()
}
