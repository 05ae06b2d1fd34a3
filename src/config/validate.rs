// src/config/validate.rs

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveTime;
use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, TriggerConfig, TriggerKind};
use crate::errors::{FlowchainError, Result};
use crate::runlog::SETUP_STAGE;
use crate::types::StageName;

/// Stage and trigger names end up in log lines, crontab tags and
/// `schtasks /TN`, so they are restricted to a conservative charset.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid name regex"));

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowchainError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, order))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Vec<StageName>> {
    ensure_has_stages(cfg)?;
    validate_global_config(cfg)?;
    validate_stage_dependencies(cfg)?;
    let order = validate_chain(cfg)?;
    validate_triggers(cfg)?;
    validate_watch(cfg)?;
    Ok(order)
}

fn ensure_has_stages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(FlowchainError::ConfigError(
            "config must contain at least one [stage.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.lease_ttl_hours == 0 {
        return Err(FlowchainError::ConfigError(
            "[config].lease_ttl_hours must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.log_file.as_os_str().is_empty() {
        return Err(FlowchainError::ConfigError(
            "[config].log_file must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        if !NAME_RE.is_match(name) {
            return Err(FlowchainError::ConfigError(format!(
                "stage name '{}' may only contain letters, digits, '_', '.' and '-'",
                name
            )));
        }
        if name == SETUP_STAGE {
            return Err(FlowchainError::ConfigError(format!(
                "stage name '{}' is reserved for environment setup records",
                SETUP_STAGE
            )));
        }
        if stage.cmd.trim().is_empty() {
            return Err(FlowchainError::ConfigError(format!(
                "stage '{}' has an empty `cmd`",
                name
            )));
        }
        if let Some(ref dep) = stage.after {
            if !cfg.stage.contains_key(dep) {
                return Err(FlowchainError::ConfigError(format!(
                    "stage '{}' has unknown predecessor '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(FlowchainError::ConfigError(format!(
                    "stage '{}' cannot come after itself",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Check the stages form exactly one linear chain and return it head first.
fn validate_chain(cfg: &RawConfigFile) -> Result<Vec<StageName>> {
    // Edge direction: predecessor -> stage.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, stage) in cfg.stage.iter() {
        if let Some(ref dep) = stage.after {
            graph.add_edge(dep.as_str(), name.as_str(), ());
            successors.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            return Err(FlowchainError::ChainShape(format!(
                "cycle detected in stage chain involving stage '{}'",
                cycle.node_id()
            )));
        }
    };

    let heads: Vec<&str> = cfg
        .stage
        .iter()
        .filter(|(_, stage)| stage.after.is_none())
        .map(|(name, _)| name.as_str())
        .collect();
    if heads.len() != 1 {
        return Err(FlowchainError::ChainShape(format!(
            "exactly one stage must have no `after` (found {}: {:?})",
            heads.len(),
            heads
        )));
    }

    if let Some((stage, next)) = successors.iter().find(|(_, next)| next.len() > 1) {
        return Err(FlowchainError::ChainShape(format!(
            "stage '{}' is followed by more than one stage ({:?}); chains cannot branch",
            stage, next
        )));
    }

    Ok(order.into_iter().map(str::to_string).collect())
}

fn validate_triggers(cfg: &RawConfigFile) -> Result<()> {
    for (name, trigger) in cfg.trigger.iter() {
        if !NAME_RE.is_match(name) {
            return Err(FlowchainError::ConfigError(format!(
                "trigger name '{}' may only contain letters, digits, '_', '.' and '-'",
                name
            )));
        }
        match trigger.kind {
            TriggerKind::Monthly => validate_monthly(cfg, name, trigger)?,
            TriggerKind::Keepalive => validate_keepalive(name, trigger)?,
        }
    }
    Ok(())
}

fn validate_monthly(cfg: &RawConfigFile, name: &str, trigger: &TriggerConfig) -> Result<()> {
    match trigger.day {
        Some(day) if (1..=31).contains(&day) => {}
        Some(day) => {
            return Err(FlowchainError::ConfigError(format!(
                "trigger '{}': day must be within 1..=31 (got {})",
                name, day
            )));
        }
        None => {
            return Err(FlowchainError::ConfigError(format!(
                "trigger '{}': monthly triggers need a `day`",
                name
            )));
        }
    }
    let Some(ref at) = trigger.at else {
        return Err(FlowchainError::ConfigError(format!(
            "trigger '{}': monthly triggers need an `at` time",
            name
        )));
    };
    parse_trigger_time(name, at)?;
    if let Some(ref from) = trigger.from {
        if !cfg.stage.contains_key(from) {
            return Err(FlowchainError::ConfigError(format!(
                "trigger '{}' starts at unknown stage '{}'",
                name, from
            )));
        }
    }
    Ok(())
}

fn validate_keepalive(name: &str, trigger: &TriggerConfig) -> Result<()> {
    match trigger.cmd {
        Some(ref cmd) if !cmd.trim().is_empty() => {}
        _ => {
            return Err(FlowchainError::ConfigError(format!(
                "trigger '{}': keepalive triggers need a `cmd`",
                name
            )));
        }
    }
    if let Some(ref at) = trigger.at {
        parse_trigger_time(name, at)?;
    }
    if !trigger.effective_on_boot() && trigger.at.is_none() {
        return Err(FlowchainError::ConfigError(format!(
            "trigger '{}' never fires: set `on_boot = true` or an `at` time",
            name
        )));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    let Some(ref watch) = cfg.watch else {
        return Ok(());
    };
    if !cfg.stage.contains_key(&watch.from_stage) {
        return Err(FlowchainError::ConfigError(format!(
            "[watch].from_stage refers to unknown stage '{}'",
            watch.from_stage
        )));
    }
    Glob::new(&watch.pattern).map_err(|e| {
        FlowchainError::ConfigError(format!(
            "[watch].pattern '{}' is not a valid glob: {}",
            watch.pattern, e
        ))
    })?;
    Ok(())
}

fn parse_trigger_time(name: &str, at: &str) -> Result<NaiveTime> {
    parse_clock_time(at).ok_or_else(|| {
        FlowchainError::ConfigError(format!(
            "trigger '{}': `at = \"{}\"` is not a valid HH:MM time",
            name, at
        ))
    })
}

/// Parse a 24h `HH:MM` wall-clock time.
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}
