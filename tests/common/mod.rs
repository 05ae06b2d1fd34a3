#![allow(dead_code)]

use std::sync::Arc;

use flowchain::chain::ChainController;
use flowchain::config::ConfigFile;
use flowchain::exec::EnvironmentSetup;
use flowchain::fs::FileSystem;
use flowchain::fs::mock::MockFileSystem;
use flowchain::runlog::RunLog;

#[allow(unused_imports)]
pub use flowchain_test_utils::builders;
#[allow(unused_imports)]
pub use flowchain_test_utils::clock::StepClock;
#[allow(unused_imports)]
pub use flowchain_test_utils::fake_executor::ScriptedExecutor;
#[allow(unused_imports)]
pub use flowchain_test_utils::{init_tracing, with_timeout};

/// In-memory filesystem with the config's working directory in place.
pub fn mock_fs(cfg: &ConfigFile) -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_dir(cfg.working_dir());
    fs
}

/// Controller over `fs` with a deterministic clock.
pub fn controller(
    cfg: &ConfigFile,
    fs: &MockFileSystem,
    executor: ScriptedExecutor,
) -> ChainController<ScriptedExecutor> {
    let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let log = RunLog::with_clock(handle.clone(), cfg.log_path(), Arc::new(StepClock::monthly_run()));
    let setup = EnvironmentSetup::from_config(cfg, handle);
    ChainController::new(executor, log, setup)
}

/// Run log lines without their timestamps, e.g. `[prepare] SUCCESS`.
pub fn log_entries(cfg: &ConfigFile, fs: &MockFileSystem) -> Vec<String> {
    fs.contents(cfg.log_path())
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split_once(" - ").map(|(_, rest)| rest.to_string()))
        .collect()
}
