// src/lib.rs

pub mod chain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod lease;
pub mod logging;
pub mod runlog;
pub mod trigger;
pub mod types;
pub mod watch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainController, ChainPlan, ChainReport};
use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::errors::FlowchainError;
use crate::exec::{EnvironmentSetup, ProcessExecutor, StageExecutor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::lease::RunLease;
use crate::runlog::{RunLog, SystemClock};
use crate::trigger::{
    ScheduledTrigger, SchedulerBackend, TriggerContext, TriggerRegistrar, system_backend,
    triggers_from_config,
};
use crate::watch::{Hotfolder, MANIFEST_ENV_VAR, spawn_dir_watcher};

/// Seconds between full hotfolder rescans in `watch` mode.
const RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code: 0 on success, the failing stage's own
/// code, or 1 for setup and registration failures. Configuration, lease
/// and other infrastructure errors are returned as `Err`.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    match args.command {
        Command::Chain { from } => {
            let full = ChainPlan::from_config(&cfg);
            let plan = match from {
                Some(ref stage) => full.starting_at(stage)?,
                None => full,
            };
            let report = execute_chain(&cfg, fs, ProcessExecutor, plan, BTreeMap::new()).await?;
            Ok(report.exit_code())
        }
        Command::Stage { name, only } => {
            let plan = ChainPlan::from_config(&cfg).manual(&name, only)?;
            let report = execute_chain(&cfg, fs, ProcessExecutor, plan, BTreeMap::new()).await?;
            Ok(report.exit_code())
        }
        Command::Register { triggers } => {
            let ctx = trigger_context(&cfg, &config_path)?;
            let mut registrar = TriggerRegistrar::new(system_backend(cfg.scheduler.backend));
            register_triggers(&mut registrar, &cfg, &ctx, &triggers)
        }
        Command::Unregister { name } => {
            let mut registrar = TriggerRegistrar::new(system_backend(cfg.scheduler.backend));
            registrar.unregister(&name)?;
            Ok(0)
        }
        Command::History { lines } => {
            let log = RunLog::new(fs, cfg.log_path());
            for record in log.tail(lines)? {
                println!("{record}");
            }
            Ok(0)
        }
        Command::Plan => {
            let ctx = trigger_context(&cfg, &config_path)?;
            print_plan(&cfg, &ctx)?;
            Ok(0)
        }
        Command::Watch => watch_hotfolder(&cfg, fs).await,
    }
}

/// Run one chain instance under the run lease.
///
/// The lease is held for the whole chain, environment setup included, and
/// released when the chain ends.
pub async fn execute_chain<E: StageExecutor>(
    cfg: &ConfigFile,
    fs: Arc<dyn FileSystem>,
    executor: E,
    plan: ChainPlan,
    vars: BTreeMap<String, String>,
) -> Result<ChainReport> {
    let ttl = i64::try_from(cfg.config.lease_ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or(chrono::Duration::MAX);
    let lease = RunLease::acquire(fs.clone(), cfg.lock_path(), ttl, &SystemClock)?;

    let mut controller = build_controller(cfg, fs, executor);
    let report = controller.run_with_vars(plan, vars).await;

    if let Err(err) = lease.release() {
        warn!(error = %err, "could not release run lease");
    }
    report
}

/// Wire a controller to the configured run log and environment.
pub fn build_controller<E: StageExecutor>(
    cfg: &ConfigFile,
    fs: Arc<dyn FileSystem>,
    executor: E,
) -> ChainController<E> {
    let log = RunLog::new(fs.clone(), cfg.log_path());
    let setup = EnvironmentSetup::from_config(cfg, fs);
    ChainController::new(executor, log, setup)
}

/// Where registered triggers point back to: this executable (or the
/// configured `[scheduler] program`) and the absolute config path.
pub fn trigger_context(cfg: &ConfigFile, config_path: &Path) -> Result<TriggerContext> {
    let program = match cfg.scheduler.program {
        Some(ref p) => cfg.resolve(p),
        None => std::env::current_exe().context("locating the flowchain executable")?,
    };
    let config_path = std::path::absolute(config_path)
        .with_context(|| format!("resolving config path {:?}", config_path))?;
    let working_dir = std::path::absolute(cfg.working_dir())
        .with_context(|| format!("resolving working directory {:?}", cfg.working_dir()))?;
    Ok(TriggerContext::new(program, config_path, working_dir))
}

/// Register the named triggers (or all of them). Each failure is reported
/// on its own and does not affect the others; any failure makes the exit
/// code 1.
pub fn register_triggers<B: SchedulerBackend>(
    registrar: &mut TriggerRegistrar<B>,
    cfg: &ConfigFile,
    ctx: &TriggerContext,
    names: &[String],
) -> Result<i32> {
    let all = triggers_from_config(cfg, ctx)?;
    let selected: Vec<&ScheduledTrigger> = if names.is_empty() {
        all.iter().collect()
    } else {
        names
            .iter()
            .map(|name| {
                all.iter()
                    .find(|t| &t.name == name)
                    .ok_or_else(|| FlowchainError::TriggerNotFound(name.clone()))
            })
            .collect::<std::result::Result<_, _>>()?
    };

    if selected.is_empty() {
        info!("no triggers configured");
        return Ok(0);
    }

    let mut failed = 0;
    for (name, result) in registrar.register_all(selected) {
        match result {
            Ok(()) => println!("registered {name}"),
            Err(err) => {
                failed += 1;
                eprintln!("failed to register {name}: {err}");
            }
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

/// Watch the hotfolder and run the chain tail once per new manifest.
///
/// Runs are strictly sequential: manifests arriving while a chain runs are
/// queued and handled afterwards.
async fn watch_hotfolder(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Result<i32> {
    let section = cfg
        .watch
        .as_ref()
        .ok_or_else(|| FlowchainError::ConfigError("no [watch] section configured".into()))?;
    let plan = ChainPlan::from_config(cfg).starting_at(&section.from_stage)?;

    let mut hotfolder = Hotfolder::open(fs.clone(), cfg.resolve(&section.dir), &section.pattern)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let _watcher = spawn_dir_watcher(hotfolder.dir(), tx)?;
    let mut rescan = tokio::time::interval(RESCAN_INTERVAL);

    info!(
        dir = ?hotfolder.dir(),
        pattern = %section.pattern,
        from = %section.from_stage,
        "watching hotfolder"
    );

    loop {
        let manifests: Vec<PathBuf> = tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("failed to listen for Ctrl+C: {e}");
                }
                info!("interrupt received; stopping watcher");
                break;
            }
            Some(path) = rx.recv() => hotfolder.accept(&path).into_iter().collect(),
            _ = rescan.tick() => match hotfolder.scan() {
                Ok(found) => found,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "hotfolder rescan failed");
                    Vec::new()
                }
            },
        };

        for manifest in manifests {
            info!(manifest = ?manifest, "new manifest detected");
            let vars = BTreeMap::from([(
                MANIFEST_ENV_VAR.to_string(),
                manifest.to_string_lossy().into_owned(),
            )]);
            match execute_chain(cfg, fs.clone(), ProcessExecutor, plan.clone(), vars).await {
                Ok(report) => info!(
                    manifest = ?manifest,
                    exit_code = report.exit_code(),
                    "chain for manifest finished"
                ),
                Err(err) => error!(
                    manifest = ?manifest,
                    error = %format!("{err:#}"),
                    "chain for manifest could not run"
                ),
            }
        }
    }

    Ok(0)
}

/// Plan output: print the chain and the triggers without running anything.
fn print_plan(cfg: &ConfigFile, ctx: &TriggerContext) -> Result<()> {
    let plan = ChainPlan::from_config(cfg);

    println!("flowchain plan");
    println!("  run log: {}", cfg.log_path().display());
    println!("  lock file: {}", cfg.lock_path().display());
    println!("  working dir: {}", cfg.working_dir().display());
    println!();

    println!("stages ({}):", plan.len());
    for (idx, stage) in plan.stages().iter().enumerate() {
        let head = if plan.is_head(&stage.name) { " (head)" } else { "" };
        println!("  {}. {}{head}", idx + 1, stage.name);
        if !stage.description.is_empty() {
            println!("      {}", stage.description);
        }
        println!("      cmd: {}", stage.invocation);
    }

    let triggers = triggers_from_config(cfg, ctx)?;
    if !triggers.is_empty() {
        println!();
        println!(
            "triggers ({}, backend {:?}):",
            triggers.len(),
            cfg.scheduler.backend.resolve()
        );
        for trigger in &triggers {
            let when: Vec<String> = trigger.conditions.iter().map(|c| c.to_string()).collect();
            println!("  - {}: {}", trigger.name, when.join(", "));
            println!("      run: {}", trigger.action.command_line());
        }
    }

    if let Some(ref watch) = cfg.watch {
        println!();
        println!(
            "watch: {} ({}) -> chain from {}",
            cfg.resolve(&watch.dir).display(),
            watch.pattern,
            watch.from_stage
        );
    }

    debug!("plan complete (no execution)");
    Ok(())
}
