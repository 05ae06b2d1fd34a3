// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{SchedulerBackendKind, StageName};

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [config]
/// log_file = "logs/pipeline.log"
///
/// [stage.acquisition]
/// cmd = "python"
/// args = ["-m", "flows.currency_acquisition_flow"]
///
/// [stage.prepare]
/// cmd = "python -m flows.prepare_batch_flow"
/// after = "acquisition"
///
/// [trigger.Pipeline]
/// kind = "monthly"
/// day = 17
/// at = "09:00"
/// ```
///
/// All sections except `[stage.*]` are optional. Turn this into a
/// [`ConfigFile`] with `ConfigFile::try_from` to get validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub environment: EnvironmentSection,

    /// All stages from `[stage.<name>]`, keyed by stage name.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,

    /// All triggers from `[trigger.<name>]`, keyed by trigger name (the
    /// unique key in the OS scheduler).
    #[serde(default)]
    pub trigger: BTreeMap<String, TriggerConfig>,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub watch: Option<WatchSection>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so `stage_order` always
/// lists every stage exactly once, head first.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub environment: EnvironmentSection,
    pub stage: BTreeMap<String, StageConfig>,
    pub trigger: BTreeMap<String, TriggerConfig>,
    pub scheduler: SchedulerSection,
    pub watch: Option<WatchSection>,
    stage_order: Vec<StageName>,
    base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, stage_order: Vec<StageName>) -> Self {
        Self {
            config: raw.config,
            environment: raw.environment,
            stage: raw.stage,
            trigger: raw.trigger,
            scheduler: raw.scheduler,
            watch: raw.watch,
            stage_order,
            base_dir: PathBuf::from("."),
        }
    }

    /// Stage names in execution order.
    pub fn stage_order(&self) -> &[StageName] {
        &self.stage_order
    }

    /// Directory relative paths in the config are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Resolve a config-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.config.log_file)
    }

    /// Lock file guarding against concurrent chain runs.
    ///
    /// Defaults to `.flowchain.lock` next to the run log.
    pub fn lock_path(&self) -> PathBuf {
        match self.config.lock_file {
            Some(ref p) => self.resolve(p),
            None => {
                let log = self.log_path();
                match log.parent() {
                    Some(dir) => dir.join(".flowchain.lock"),
                    None => PathBuf::from(".flowchain.lock"),
                }
            }
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        match self.environment.working_dir {
            Some(ref p) => self.resolve(p),
            None => self.base_dir.clone(),
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Append-only run log, one line per stage outcome.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Optional explicit lock file location.
    #[serde(default)]
    pub lock_file: Option<PathBuf>,

    /// A lease older than this is considered abandoned (e.g. the holder was
    /// killed) and is reclaimed.
    #[serde(default = "default_lease_ttl_hours")]
    pub lease_ttl_hours: u64,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/flowchain.log")
}

fn default_lease_ttl_hours() -> u64 {
    24
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            lock_file: None,
            lease_ttl_hours: default_lease_ttl_hours(),
        }
    }
}

/// `[environment]` section: the preconditions checked before any stage runs.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentSection {
    /// Working directory for every stage. Defaults to the config directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Python virtual environment to activate for the stages.
    #[serde(default)]
    pub venv: Option<PathBuf>,

    /// Paths that must exist before the chain starts.
    #[serde(default)]
    pub require: Vec<PathBuf>,

    /// Staging directories created (if missing) before the chain starts.
    #[serde(default)]
    pub ensure_dirs: Vec<PathBuf>,

    /// Shell command that must exit 0 before the chain starts.
    #[serde(default)]
    pub check: Option<String>,

    /// Extra environment variables exported to every stage.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Program to run, or a full shell command line when `args` is absent.
    pub cmd: String,

    /// Explicit argument vector. When present, `cmd` is executed directly
    /// instead of through the shell.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub description: Option<String>,

    /// The stage this one follows. Exactly one stage has no `after`.
    #[serde(default)]
    pub after: Option<String>,

    /// When true, a manual run of this stage continues down the chain on
    /// success. The first stage always behaves as a head.
    #[serde(default)]
    pub head: bool,
}

/// Kind of OS trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Fires the chain once a month at `day` / `at`.
    Monthly,
    /// Keeps a long-running worker alive: fires on boot and daily at `at`.
    Keepalive,
}

/// `[trigger.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub kind: TriggerKind,

    /// Day of month (monthly only).
    #[serde(default)]
    pub day: Option<u32>,

    /// Time of day, `HH:MM` (24h).
    #[serde(default)]
    pub at: Option<String>,

    /// Keepalive: also fire at system startup. Defaults to true.
    #[serde(default)]
    pub on_boot: Option<bool>,

    /// Monthly: start the chain at this stage instead of the head.
    #[serde(default)]
    pub from: Option<String>,

    /// Keepalive: worker command (a shell line unless `args` is given).
    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub args: Option<Vec<String>>,
}

impl TriggerConfig {
    pub fn effective_on_boot(&self) -> bool {
        self.on_boot.unwrap_or(true)
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SchedulerSection {
    #[serde(default)]
    pub backend: SchedulerBackendKind,

    /// flowchain executable the monthly trigger invokes. Defaults to the
    /// currently running binary.
    #[serde(default)]
    pub program: Option<PathBuf>,
}

/// `[watch]` section: hotfolder that triggers the chain tail.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    pub dir: PathBuf,

    #[serde(default = "default_manifest_pattern")]
    pub pattern: String,

    /// Stage the chain is entered at for each new manifest.
    pub from_stage: String,
}

fn default_manifest_pattern() -> String {
    "*_MANIFEST.json".to_string()
}
