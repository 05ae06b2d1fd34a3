// src/trigger/registrar.rs

use tracing::{info, warn};

use crate::errors::{FlowchainError, Result};

use super::model::ScheduledTrigger;
use super::{DeleteOutcome, SchedulerBackend};

/// Idempotent trigger registration on top of a [`SchedulerBackend`].
#[derive(Debug)]
pub struct TriggerRegistrar<B: SchedulerBackend> {
    backend: B,
}

impl<B: SchedulerBackend> TriggerRegistrar<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Upsert: remove any trigger with the same name, then create it.
    ///
    /// A missing previous trigger is fine. Backend rejections are returned
    /// as [`FlowchainError::Registration`] and not retried.
    pub fn register(&mut self, trigger: &ScheduledTrigger) -> Result<()> {
        let previous = self
            .backend
            .delete(&trigger.name)
            .map_err(|e| registration_error(&trigger.name, e))?;
        if previous == DeleteOutcome::Deleted {
            info!(trigger = %trigger.name, "replacing existing trigger");
        }

        self.backend
            .create(trigger)
            .map_err(|e| registration_error(&trigger.name, e))?;

        let when: Vec<String> = trigger.conditions.iter().map(|c| c.to_string()).collect();
        info!(
            trigger = %trigger.name,
            backend = self.backend.name(),
            ?when,
            cmd = %trigger.action.command_line(),
            "trigger registered"
        );
        Ok(())
    }

    /// Register every trigger. A failure does not stop the remaining ones.
    pub fn register_all<'a>(
        &mut self,
        triggers: impl IntoIterator<Item = &'a ScheduledTrigger>,
    ) -> Vec<(String, Result<()>)> {
        triggers
            .into_iter()
            .map(|trigger| {
                let result = self.register(trigger);
                if let Err(ref err) = result {
                    warn!(trigger = %trigger.name, error = %err, "trigger registration failed");
                }
                (trigger.name.clone(), result)
            })
            .collect()
    }

    pub fn unregister(&mut self, name: &str) -> Result<DeleteOutcome> {
        let outcome = self
            .backend
            .delete(name)
            .map_err(|e| registration_error(name, e))?;
        match outcome {
            DeleteOutcome::Deleted => info!(trigger = name, "trigger removed"),
            DeleteOutcome::NotFound => info!(trigger = name, "no such trigger registered"),
        }
        Ok(outcome)
    }

    pub fn is_registered(&self, name: &str) -> Result<bool> {
        self.backend
            .exists(name)
            .map_err(|e| registration_error(name, e))
    }
}

fn registration_error(trigger: &str, err: anyhow::Error) -> FlowchainError {
    FlowchainError::Registration {
        trigger: trigger.to_string(),
        message: format!("{err:#}"),
    }
}
