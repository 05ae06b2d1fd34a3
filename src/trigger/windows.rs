// src/trigger/windows.rs

//! Windows Task Scheduler backend.
//!
//! Single-condition triggers go through `schtasks.exe`. Triggers with
//! several conditions (keepalive: at startup + daily) need one task with
//! multiple triggers, which `schtasks` cannot express, so they are
//! registered with PowerShell's `Register-ScheduledTask`.

use std::fmt::Debug;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::model::{FireCondition, ScheduledTrigger};
use super::{DeleteOutcome, SchedulerBackend};

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        text.to_string()
    }
}

/// Runs an external program to completion. Swapped out in tests.
pub trait CommandRunner: Debug {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program, ?args, "running scheduler command");
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("running {program}"))?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug)]
pub struct WindowsTaskScheduler<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> WindowsTaskScheduler<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

const SCHTASKS: &str = "schtasks";
const POWERSHELL: &str = "powershell";

const PRESENT_MARKER: &str = "flowchain-task-present";

/// PowerShell arguments that print [`PRESENT_MARKER`] when task `name` exists.
///
/// `schtasks` reports a missing task through localized text only, so
/// existence is decided from this marker instead.
pub fn powershell_query_args(name: &str) -> Vec<String> {
    vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        format!(
            "if (Get-ScheduledTask -TaskName {} -ErrorAction SilentlyContinue) {{ '{PRESENT_MARKER}' }}",
            ps_quote(name)
        ),
    ]
}

/// `schtasks /Create` arguments for a single-condition trigger.
pub fn schtasks_create_args(trigger: &ScheduledTrigger) -> Result<Vec<String>> {
    let [condition] = trigger.conditions.as_slice() else {
        bail!(
            "schtasks can only register one condition, trigger '{}' has {}",
            trigger.name,
            trigger.conditions.len()
        );
    };

    let action = &trigger.action;
    let task_run = format!(
        "cmd /C cd /D \"{}\" && {}",
        action.working_dir.display(),
        action.command_line()
    );

    let mut args: Vec<String> = [
        "/Create",
        "/F",
        "/TN",
        trigger.name.as_str(),
        "/TR",
        task_run.as_str(),
    ]
        .into_iter()
        .map(String::from)
        .collect();

    match condition {
        FireCondition::Monthly { day, at } => {
            args.extend([
                String::from("/SC"),
                String::from("MONTHLY"),
                String::from("/D"),
                day.to_string(),
                String::from("/ST"),
                at.format("%H:%M").to_string(),
            ]);
        }
        FireCondition::Daily { at } => {
            args.extend([
                String::from("/SC"),
                String::from("DAILY"),
                String::from("/ST"),
                at.format("%H:%M").to_string(),
            ]);
        }
        FireCondition::AtStartup => {
            args.extend([String::from("/SC"), String::from("ONSTART")]);
        }
    }
    Ok(args)
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// PowerShell script registering a task with several triggers.
pub fn powershell_register_script(trigger: &ScheduledTrigger) -> Result<String> {
    let mut parts = Vec::new();
    for condition in &trigger.conditions {
        match condition {
            FireCondition::AtStartup => parts.push("(New-ScheduledTaskTrigger -AtStartup)".to_string()),
            FireCondition::Daily { at } => parts.push(format!(
                "(New-ScheduledTaskTrigger -Daily -At {})",
                ps_quote(&at.format("%H:%M").to_string())
            )),
            FireCondition::Monthly { .. } => bail!(
                "trigger '{}': monthly conditions cannot be combined with others",
                trigger.name
            ),
        }
    }

    let action = &trigger.action;
    let arguments = action
        .args
        .iter()
        .map(|a| {
            if a.contains(char::is_whitespace) {
                format!("\"{a}\"")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let mut new_action = format!(
        "New-ScheduledTaskAction -Execute {} -WorkingDirectory {}",
        ps_quote(&action.program),
        ps_quote(&action.working_dir.to_string_lossy())
    );
    if !arguments.is_empty() {
        new_action.push_str(&format!(" -Argument {}", ps_quote(&arguments)));
    }

    Ok([
        format!("$action = {new_action}"),
        format!("$triggers = @({})", parts.join(", ")),
        "$settings = New-ScheduledTaskSettingsSet -MultipleInstances IgnoreNew \
         -RestartCount 3 -RestartInterval (New-TimeSpan -Minutes 1) -StartWhenAvailable"
            .to_string(),
        format!(
            "Register-ScheduledTask -TaskName {} -Action $action -Trigger $triggers \
             -Settings $settings -Force | Out-Null",
            ps_quote(&trigger.name)
        ),
    ]
    .join("; "))
}

impl<R: CommandRunner> SchedulerBackend for WindowsTaskScheduler<R> {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn create(&mut self, trigger: &ScheduledTrigger) -> Result<()> {
        let (program, args) = match trigger.conditions.len() {
            0 => bail!("trigger '{}' has no fire condition", trigger.name),
            1 => (SCHTASKS, schtasks_create_args(trigger)?),
            _ => (
                POWERSHELL,
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    powershell_register_script(trigger)?,
                ],
            ),
        };

        let output = self.runner.run(program, &args)?;
        if !output.success {
            bail!("{program} rejected the task: {}", output.message());
        }
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<DeleteOutcome> {
        if !self.exists(name)? {
            return Ok(DeleteOutcome::NotFound);
        }
        let args: Vec<String> = ["/Delete", "/TN", name, "/F"]
            .into_iter()
            .map(String::from)
            .collect();
        let output = self.runner.run(SCHTASKS, &args)?;
        if !output.success {
            bail!("schtasks could not delete '{name}': {}", output.message());
        }
        Ok(DeleteOutcome::Deleted)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let output = self.runner.run(POWERSHELL, &powershell_query_args(name))?;
        if !output.success {
            bail!("could not query task '{name}': {}", output.message());
        }
        Ok(output.stdout.lines().any(|line| line.trim() == PRESENT_MARKER))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    use chrono::NaiveTime;

    use super::*;
    use crate::trigger::model::TriggerAction;
    use crate::trigger::registrar::TriggerRegistrar;

    /// Records invocations and replays canned outputs (success by default).
    #[derive(Debug, Default)]
    struct Recording {
        calls: RefCell<Vec<(String, Vec<String>)>>,
        replies: RefCell<VecDeque<CommandOutput>>,
    }

    impl Recording {
        fn reply(self, output: CommandOutput) -> Self {
            self.replies.borrow_mut().push_back(output);
            self
        }
    }

    impl CommandRunner for Recording {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            Ok(self.replies.borrow_mut().pop_front().unwrap_or(CommandOutput {
                success: true,
                ..Default::default()
            }))
        }
    }

    fn action() -> TriggerAction {
        TriggerAction {
            program: r"C:\tools\flowchain.exe".into(),
            args: vec!["--config".into(), r"C:\pipeline\Flowchain.toml".into(), "chain".into()],
            working_dir: PathBuf::from(r"C:\pipeline"),
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn monthly_uses_schtasks() {
        let mut sched = WindowsTaskScheduler::new(Recording::default());
        sched
            .create(&ScheduledTrigger::monthly("Pipeline", 17, at(9, 0), action()))
            .unwrap();

        let calls = sched.runner().calls.borrow();
        let (program, args) = &calls[0];
        assert_eq!(program, "schtasks");
        assert_eq!(&args[..4], ["/Create", "/F", "/TN", "Pipeline"]);
        assert_eq!(&args[6..], ["/SC", "MONTHLY", "/D", "17", "/ST", "09:00"]);
        assert!(args[5].ends_with(r"chain"));
        assert!(args[5].starts_with(r#"cmd /C cd /D "C:\pipeline" && "#));
    }

    #[test]
    fn keepalive_uses_powershell_with_both_triggers() {
        let mut sched = WindowsTaskScheduler::new(Recording::default());
        let trigger = ScheduledTrigger::keepalive("Worker", true, Some(at(8, 0)), action());
        sched.create(&trigger).unwrap();

        let calls = sched.runner().calls.borrow();
        let (program, args) = &calls[0];
        assert_eq!(program, "powershell");
        let script = args.last().unwrap();
        assert!(script.contains("New-ScheduledTaskTrigger -AtStartup"));
        assert!(script.contains("New-ScheduledTaskTrigger -Daily -At '08:00'"));
        assert!(script.contains("-MultipleInstances IgnoreNew"));
        assert!(script.contains("-TaskName 'Worker'"));
    }

    fn present() -> CommandOutput {
        CommandOutput {
            success: true,
            stdout: format!("{PRESENT_MARKER}\r\n"),
            stderr: String::new(),
        }
    }

    fn absent() -> CommandOutput {
        CommandOutput {
            success: true,
            ..Default::default()
        }
    }

    #[test]
    fn delete_of_unknown_task_is_not_found() {
        let mut sched = WindowsTaskScheduler::new(Recording::default().reply(absent()));
        assert_eq!(sched.delete("Pipeline").unwrap(), DeleteOutcome::NotFound);

        let calls = sched.runner().calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "powershell");
        assert!(calls[0].1[3].contains("Get-ScheduledTask -TaskName 'Pipeline'"));
    }

    #[test]
    fn first_register_on_german_host_succeeds() {
        // A German schtasks would answer /Delete with "FEHLER: Das System kann
        // die angegebene Datei nicht finden." The query never reaches it.
        let runner = Recording::default()
            .reply(absent())
            .reply(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "FEHLER: Das System kann die angegebene Datei nicht finden.".into(),
            });
        let mut registrar = TriggerRegistrar::new(WindowsTaskScheduler::new(runner));
        registrar
            .register(&ScheduledTrigger::monthly("Pipeline", 17, at(9, 0), action()))
            .unwrap();

        let calls = registrar.backend().runner().calls.borrow();
        let programs: Vec<&str> = calls.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(programs, ["powershell", "schtasks"]);
        assert_eq!(calls[1].1[0], "/Create");
    }

    #[test]
    fn existing_task_is_deleted() {
        let mut sched = WindowsTaskScheduler::new(Recording::default().reply(present()));
        assert_eq!(sched.delete("Pipeline").unwrap(), DeleteOutcome::Deleted);

        let calls = sched.runner().calls.borrow();
        assert_eq!(calls[1].0, "schtasks");
        assert_eq!(calls[1].1, ["/Delete", "/TN", "Pipeline", "/F"]);
    }

    #[test]
    fn failed_delete_of_existing_task_is_an_error() {
        let runner = Recording::default().reply(present()).reply(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "FEHLER: Zugriff verweigert.".into(),
        });
        let mut sched = WindowsTaskScheduler::new(runner);
        let err = sched.delete("Pipeline").unwrap_err();
        assert!(format!("{err:#}").contains("Zugriff verweigert"));
    }

    #[test]
    fn access_denied_is_an_error() {
        let runner = Recording::default().reply(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "ERROR: Access is denied.".into(),
        });
        let mut sched = WindowsTaskScheduler::new(runner);
        let err = sched
            .create(&ScheduledTrigger::monthly("Pipeline", 17, at(9, 0), action()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Access is denied"));
    }

    #[test]
    fn monthly_cannot_be_combined() {
        let mut trigger = ScheduledTrigger::monthly("Mixed", 1, at(1, 0), action());
        trigger.conditions.push(FireCondition::AtStartup);
        assert!(powershell_register_script(&trigger).is_err());
    }
}
