// src/exec/setup.rs

//! Environment preconditions checked before a chain starts.
//!
//! A failure here is distinct from a stage failure: no stage is attempted,
//! the run log gets a single `[setup] FAILED (Error 1)` line and the process
//! exits with 1.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::chain::plan::Invocation;
use crate::config::model::ConfigFile;
use crate::fs::FileSystem;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("working directory {0:?} does not exist")]
    MissingWorkingDir(PathBuf),

    #[error("virtual environment {venv:?} has no interpreter at {interpreter:?}")]
    MissingVenv { venv: PathBuf, interpreter: PathBuf },

    #[error("required path {0:?} does not exist")]
    MissingPath(PathBuf),

    #[error("could not create staging directory {path:?}: {reason}")]
    CreateDir { path: PathBuf, reason: String },

    #[error("could not build PATH for the virtual environment: {0}")]
    InvalidPath(String),

    #[error("environment check `{cmd}` failed: {detail}")]
    CheckFailed { cmd: String, detail: String },
}

/// Working directory and environment variables every stage runs with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageEnv {
    pub working_dir: PathBuf,
    pub vars: BTreeMap<String, String>,
}

impl StageEnv {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn apply(&self, cmd: &mut Command) {
        cmd.current_dir(&self.working_dir);
        cmd.envs(&self.vars);
    }
}

/// The `[environment]` preconditions, resolved to concrete paths.
#[derive(Debug, Clone)]
pub struct EnvironmentSetup {
    fs: Arc<dyn FileSystem>,
    working_dir: PathBuf,
    venv: Option<PathBuf>,
    require: Vec<PathBuf>,
    ensure_dirs: Vec<PathBuf>,
    check: Option<String>,
    vars: BTreeMap<String, String>,
}

impl EnvironmentSetup {
    pub fn new(fs: Arc<dyn FileSystem>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            working_dir: working_dir.into(),
            venv: None,
            require: Vec::new(),
            ensure_dirs: Vec::new(),
            check: None,
            vars: BTreeMap::new(),
        }
    }

    pub fn from_config(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Self {
        let env = &cfg.environment;
        Self {
            fs,
            working_dir: cfg.working_dir(),
            venv: env.venv.as_ref().map(|p| cfg.resolve(p)),
            require: env.require.iter().map(|p| cfg.resolve(p)).collect(),
            ensure_dirs: env.ensure_dirs.iter().map(|p| cfg.resolve(p)).collect(),
            check: env.check.clone(),
            vars: env.env.clone(),
        }
    }

    pub fn with_venv(mut self, venv: impl Into<PathBuf>) -> Self {
        self.venv = Some(venv.into());
        self
    }

    pub fn with_required(mut self, path: impl Into<PathBuf>) -> Self {
        self.require.push(path.into());
        self
    }

    pub fn with_ensure_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ensure_dirs.push(path.into());
        self
    }

    pub fn with_check(mut self, cmd: impl Into<String>) -> Self {
        self.check = Some(cmd.into());
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Verify every precondition and build the stage environment.
    ///
    /// Checks run in a fixed order and stop at the first failure.
    pub async fn prepare(&self) -> Result<StageEnv, SetupError> {
        if !self.fs.is_dir(&self.working_dir) {
            return Err(SetupError::MissingWorkingDir(self.working_dir.clone()));
        }

        let mut env = StageEnv::new(self.working_dir.clone());
        env.vars.extend(self.vars.clone());

        if let Some(ref venv) = self.venv {
            self.activate_venv(venv, &mut env)?;
        }

        for path in &self.require {
            if !self.fs.exists(path) {
                return Err(SetupError::MissingPath(path.clone()));
            }
        }

        for dir in &self.ensure_dirs {
            self.fs
                .create_dir_all(dir)
                .map_err(|e| SetupError::CreateDir {
                    path: dir.clone(),
                    reason: format!("{e:#}"),
                })?;
            debug!(dir = ?dir, "staging directory ready");
        }

        if let Some(ref check) = self.check {
            run_check(check, &env).await?;
        }

        info!(cwd = ?env.working_dir, venv = ?self.venv, "environment ready");
        Ok(env)
    }

    /// Export `VIRTUAL_ENV` and put the venv's bin dir first on `PATH`.
    fn activate_venv(&self, venv: &Path, env: &mut StageEnv) -> Result<(), SetupError> {
        let bin = venv_bin_dir(venv);
        let interpreter = bin.join(if cfg!(windows) { "python.exe" } else { "python" });
        if !self.fs.is_file(&interpreter) {
            return Err(SetupError::MissingVenv {
                venv: venv.to_path_buf(),
                interpreter,
            });
        }

        let mut paths = vec![bin];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let joined =
            std::env::join_paths(paths).map_err(|e| SetupError::InvalidPath(e.to_string()))?;

        env.vars
            .insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        env.vars
            .insert("VIRTUAL_ENV".to_string(), venv.to_string_lossy().into_owned());
        Ok(())
    }
}

pub fn venv_bin_dir(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts")
    } else {
        venv.join("bin")
    }
}

async fn run_check(check: &str, env: &StageEnv) -> Result<(), SetupError> {
    let (program, args) = Invocation::Shell(check.to_string()).argv();
    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    env.apply(&mut cmd);

    let output = cmd.output().await.map_err(|e| SetupError::CheckFailed {
        cmd: check.to_string(),
        detail: e.to_string(),
    })?;

    if output.status.success() {
        debug!(check, "environment check passed");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = match (output.status.code(), stderr.trim().lines().last()) {
        (Some(code), Some(last)) => format!("exit code {code}: {last}"),
        (Some(code), None) => format!("exit code {code}"),
        (None, _) => "terminated by signal".to_string(),
    };
    Err(SetupError::CheckFailed {
        cmd: check.to_string(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn mock() -> (MockFileSystem, Arc<dyn FileSystem>) {
        let fs = MockFileSystem::new();
        fs.add_dir("/work");
        let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());
        (fs, handle)
    }

    #[tokio::test]
    async fn missing_working_dir_fails_first() {
        let (_fs, handle) = mock();
        let err = EnvironmentSetup::new(handle, "/elsewhere")
            .prepare()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::MissingWorkingDir(_)));
    }

    #[tokio::test]
    async fn venv_without_interpreter_fails() {
        let (fs, handle) = mock();
        fs.add_dir("/work/.venv");
        let err = EnvironmentSetup::new(handle, "/work")
            .with_venv("/work/.venv")
            .prepare()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::MissingVenv { .. }));
    }

    #[tokio::test]
    async fn venv_is_exported_and_put_on_path() {
        let (fs, handle) = mock();
        let interpreter = venv_bin_dir(Path::new("/work/.venv"))
            .join(if cfg!(windows) { "python.exe" } else { "python" });
        fs.add_file(&interpreter, b"");

        let env = EnvironmentSetup::new(handle, "/work")
            .with_venv("/work/.venv")
            .with_var("PIPELINE_ROOT", "/work/data_pipeline")
            .prepare()
            .await
            .unwrap();

        assert_eq!(env.vars["VIRTUAL_ENV"], "/work/.venv");
        assert_eq!(env.vars["PIPELINE_ROOT"], "/work/data_pipeline");
        let first = std::env::split_paths(&env.vars["PATH"]).next().unwrap();
        assert_eq!(first, venv_bin_dir(Path::new("/work/.venv")));
    }

    #[tokio::test]
    async fn required_paths_and_staging_dirs() {
        let (fs, handle) = mock();
        let setup = EnvironmentSetup::new(handle, "/work")
            .with_required("/work/flows")
            .with_ensure_dir("/work/data_pipeline/1_input");

        let err = setup.prepare().await.unwrap_err();
        assert!(matches!(err, SetupError::MissingPath(ref p) if p == Path::new("/work/flows")));
        assert!(!fs.exists(Path::new("/work/data_pipeline/1_input")));

        fs.add_dir("/work/flows");
        setup.prepare().await.unwrap();
        assert!(fs.is_dir(Path::new("/work/data_pipeline/1_input")));
        // Idempotent.
        setup.prepare().await.unwrap();
    }

    #[tokio::test]
    async fn unwritable_staging_dir_is_a_setup_failure() {
        let (fs, handle) = mock();
        fs.deny_writes_under("/work/data_pipeline");
        let err = EnvironmentSetup::new(handle, "/work")
            .with_ensure_dir("/work/data_pipeline/6_logs")
            .prepare()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::CreateDir { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_check_command_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let setup = EnvironmentSetup::new(Arc::new(crate::fs::RealFileSystem), dir.path())
            .with_check("echo 'prefect not installed' >&2; exit 3");
        let err = setup.prepare().await.unwrap_err();
        match err {
            SetupError::CheckFailed { detail, .. } => {
                assert_eq!(detail, "exit code 3: prefect not installed");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = EnvironmentSetup::new(Arc::new(crate::fs::RealFileSystem), dir.path())
            .with_check("true");
        assert!(ok.prepare().await.is_ok());
    }
}
