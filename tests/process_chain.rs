// tests/process_chain.rs
//
// End-to-end chains with real child processes and a real run log.

#![cfg(unix)]

mod common;
use crate::common::builders::{ConfigFileBuilder, StageConfigBuilder};
use crate::common::{init_tracing, with_timeout};

use std::collections::BTreeMap;
use std::sync::Arc;

use flowchain::chain::ChainPlan;
use flowchain::config::ConfigFile;
use flowchain::exec::ProcessExecutor;
use flowchain::execute_chain;
use flowchain::fs::{FileSystem, RealFileSystem};
use flowchain::runlog::RunLog;

fn shell_chain(dir: &std::path::Path, cmds: &[(&str, &str)]) -> ConfigFile {
    let mut builder = ConfigFileBuilder::new()
        .with_base_dir(dir)
        .with_log_file("logs/pipeline.log");
    let mut previous: Option<&str> = None;
    for (name, cmd) in cmds {
        let mut stage = StageConfigBuilder::new(cmd);
        if let Some(prev) = previous {
            stage = stage.after(prev);
        }
        builder = builder.with_stage(name, stage.build());
        previous = Some(*name);
    }
    builder.build()
}

#[tokio::test]
async fn real_processes_share_the_working_directory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = shell_chain(
        dir.path(),
        &[
            ("acquisition", "echo rates > rates.csv"),
            ("prepare", "test -f rates.csv && cp rates.csv batch.csv"),
            ("process", "test \"$FLOWCHAIN_STAGE\" = process && test -f batch.csv"),
        ],
    );
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let report = with_timeout(execute_chain(
        &cfg,
        fs.clone(),
        ProcessExecutor,
        ChainPlan::from_config(&cfg),
        BTreeMap::new(),
    ))
    .await
    .unwrap();

    assert_eq!(report.exit_code(), 0);
    let records = RunLog::new(fs, cfg.log_path()).read_records().unwrap();
    let stages: Vec<_> = records.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(stages, ["acquisition", "prepare", "process"]);
    assert!(records.iter().all(|r| r.outcome.is_success()));
}

#[tokio::test]
async fn native_exit_code_becomes_the_chain_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = shell_chain(
        dir.path(),
        &[("acquisition", "exit 0"), ("prepare", "exit 5"), ("process", "touch never")],
    );
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let report = with_timeout(execute_chain(
        &cfg,
        fs,
        ProcessExecutor,
        ChainPlan::from_config(&cfg),
        BTreeMap::new(),
    ))
    .await
    .unwrap();

    assert_eq!(report.exit_code(), 5);
    assert!(!dir.path().join("never").exists());
    let log = std::fs::read_to_string(dir.path().join("logs/pipeline.log")).unwrap();
    let tails: Vec<_> = log.lines().map(|l| l.split_once(" - ").unwrap().1).collect();
    assert_eq!(tails, ["[acquisition] SUCCESS", "[prepare] FAILED (Error 5)"]);
}
