// src/trigger/memory.rs

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use super::model::ScheduledTrigger;
use super::{DeleteOutcome, SchedulerBackend};

/// In-process scheduler: a name-keyed map, plus a log of calls so tests can
/// assert the delete-then-create order.
#[derive(Debug, Default, Clone)]
pub struct MemoryScheduler {
    triggers: BTreeMap<String, ScheduledTrigger>,
    rejected: BTreeSet<String>,
    calls: Vec<String>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail for this trigger name.
    pub fn reject(&mut self, name: impl Into<String>) {
        self.rejected.insert(name.into());
    }

    pub fn triggers(&self) -> Vec<&ScheduledTrigger> {
        self.triggers.values().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ScheduledTrigger> {
        self.triggers.get(name)
    }

    /// `"create:<name>"` / `"delete:<name>"` in call order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }
}

impl SchedulerBackend for MemoryScheduler {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create(&mut self, trigger: &ScheduledTrigger) -> Result<()> {
        self.calls.push(format!("create:{}", trigger.name));
        if self.rejected.contains(&trigger.name) {
            bail!("access denied");
        }
        if self.triggers.contains_key(&trigger.name) {
            bail!("a trigger named '{}' already exists", trigger.name);
        }
        self.triggers.insert(trigger.name.clone(), trigger.clone());
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        self.calls.push(format!("delete:{name}"));
        Ok(match self.triggers.remove(name) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.triggers.contains_key(name))
    }
}
