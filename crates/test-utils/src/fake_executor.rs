use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use flowchain::chain::StageDescriptor;
use flowchain::exec::{StageEnv, StageExecutor};
use flowchain::types::StageOutcome;

/// One recorded stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStage {
    pub name: String,
    pub vars: BTreeMap<String, String>,
}

/// A fake executor that:
/// - records which stages were "run", with the environment they got
/// - immediately reports the scripted outcome (success unless told otherwise).
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: HashMap<String, StageOutcome>,
    executed: Arc<Mutex<Vec<ExecutedStage>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` exit with `code` (0 is success).
    pub fn exit_with(mut self, stage: &str, code: i32) -> Self {
        self.outcomes
            .insert(stage.to_string(), StageOutcome::from_exit_code(code));
        self
    }

    /// Shared handle on the invocation record. Clones of the executor share
    /// it, so a test can keep one while the controller owns the other.
    pub fn log(&self) -> Arc<Mutex<Vec<ExecutedStage>>> {
        Arc::clone(&self.executed)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }
}

impl StageExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a mut self,
        stage: &'a StageDescriptor,
        env: &'a StageEnv,
    ) -> Pin<Box<dyn Future<Output = StageOutcome> + Send + 'a>> {
        let outcome = self
            .outcomes
            .get(&stage.name)
            .copied()
            .unwrap_or(StageOutcome::Success);
        self.executed.lock().unwrap().push(ExecutedStage {
            name: stage.name.clone(),
            vars: env.vars.clone(),
        });
        Box::pin(async move { outcome })
    }
}
