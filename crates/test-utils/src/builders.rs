#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use flowchain::config::{
    ConfigFile, ConfigSection, EnvironmentSection, RawConfigFile, SchedulerSection, StageConfig,
    TriggerConfig, TriggerKind, WatchSection,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    base_dir: PathBuf,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                environment: EnvironmentSection::default(),
                stage: BTreeMap::new(),
                trigger: BTreeMap::new(),
                scheduler: SchedulerSection::default(),
                watch: None,
            },
            base_dir: PathBuf::from("/work"),
        }
    }

    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    pub fn with_trigger(mut self, name: &str, trigger: TriggerConfig) -> Self {
        self.config.trigger.insert(name.to_string(), trigger);
        self
    }

    pub fn with_log_file(mut self, path: &str) -> Self {
        self.config.config.log_file = PathBuf::from(path);
        self
    }

    pub fn with_ensure_dir(mut self, path: &str) -> Self {
        self.config.environment.ensure_dirs.push(PathBuf::from(path));
        self
    }

    pub fn with_required(mut self, path: &str) -> Self {
        self.config.environment.require.push(PathBuf::from(path));
        self
    }

    pub fn with_watch(mut self, dir: &str, from_stage: &str) -> Self {
        self.config.watch = Some(WatchSection {
            dir: PathBuf::from(dir),
            pattern: "*_MANIFEST.json".to_string(),
            from_stage: from_stage.to_string(),
        });
        self
    }

    /// Directory relative config paths resolve against (default `/work`).
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        let base_dir = self.base_dir;
        ConfigFile::try_from(self.config)
            .expect("Failed to build valid config from builder")
            .with_base_dir(base_dir)
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            stage: StageConfig {
                cmd: cmd.to_string(),
                args: None,
                description: None,
                after: None,
                head: false,
            },
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.stage.args = Some(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn after(mut self, stage: &str) -> Self {
        self.stage.after = Some(stage.to_string());
        self
    }

    pub fn head(mut self) -> Self {
        self.stage.head = true;
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.stage.description = Some(text.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// `[trigger.<name>]` for a monthly chain run.
pub fn monthly_trigger(day: u32, at: &str) -> TriggerConfig {
    TriggerConfig {
        kind: TriggerKind::Monthly,
        day: Some(day),
        at: Some(at.to_string()),
        on_boot: None,
        from: None,
        cmd: None,
        args: None,
    }
}

/// `[trigger.<name>]` keeping a worker alive.
pub fn keepalive_trigger(cmd: &str, at: Option<&str>) -> TriggerConfig {
    TriggerConfig {
        kind: TriggerKind::Keepalive,
        day: None,
        at: at.map(str::to_string),
        on_boot: None,
        from: None,
        cmd: Some(cmd.to_string()),
        args: None,
    }
}

/// The currency pipeline: acquisition -> prepare -> process.
pub fn three_stage_chain() -> ConfigFileBuilder {
    ConfigFileBuilder::new()
        .with_log_file("logs/pipeline.log")
        .with_stage(
            "acquisition",
            StageConfigBuilder::new("python")
                .args(&["-m", "flows.currency_acquisition_flow"])
                .build(),
        )
        .with_stage(
            "prepare",
            StageConfigBuilder::new("python -m flows.prepare_batch_flow")
                .after("acquisition")
                .build(),
        )
        .with_stage(
            "process",
            StageConfigBuilder::new("python -m flows.process_batch_flow")
                .after("prepare")
                .build(),
        )
}

/// A linear chain of `n` stages named `s0`, `s1`, ...
pub fn linear_chain(n: usize) -> ConfigFileBuilder {
    let mut builder = ConfigFileBuilder::new();
    for i in 0..n {
        let mut stage = StageConfigBuilder::new(&format!("run s{i}"));
        if i > 0 {
            stage = stage.after(&format!("s{}", i - 1));
        }
        builder = builder.with_stage(&format!("s{i}"), stage.build());
    }
    builder
}
