// src/exec/runner.rs

//! Individual stage process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info};

use crate::chain::plan::StageDescriptor;
use crate::exec::setup::StageEnv;
use crate::types::StageOutcome;

/// Exported to every stage process with the stage's own name.
pub const STAGE_ENV_VAR: &str = "FLOWCHAIN_STAGE";

/// Run a single stage process to completion.
///
/// - Exit code 0 is `Success`, any other code is `Failed(code)`.
/// - A process killed by a signal (no exit code) is `Failed(-1)`.
/// - If the process cannot be spawned at all, the error is logged and the
///   stage is reported as `Failed(-1)`.
pub async fn run_stage(stage: &StageDescriptor, env: &StageEnv) -> StageOutcome {
    match run_stage_inner(stage, env).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                stage = %stage.name,
                error = %format!("{err:#}"),
                "stage execution error"
            );
            StageOutcome::Failed(-1)
        }
    }
}

async fn run_stage_inner(stage: &StageDescriptor, env: &StageEnv) -> Result<StageOutcome> {
    info!(
        stage = %stage.name,
        cmd = %stage.invocation,
        cwd = ?env.working_dir,
        "starting stage process"
    );

    let (program, args) = stage.invocation.argv();
    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    env.apply(&mut cmd);
    cmd.env(STAGE_ENV_VAR, &stage.name);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for stage '{}' ({})", stage.name, program))?;

    // Always drain both pipes so the child never blocks on a full buffer.
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(stage.name.clone(), "stdout", out)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(stage.name.clone(), "stderr", err)));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of stage '{}'", stage.name))?;

    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let code = status.code().unwrap_or(-1);
    info!(
        stage = %stage.name,
        exit_code = code,
        success = status.success(),
        "stage process exited"
    );

    Ok(StageOutcome::from_exit_code(code))
}

async fn forward_lines<R>(stage: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(stage = %stage, stream, "{}", line);
    }
}
