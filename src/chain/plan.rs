// src/chain/plan.rs

//! Stage descriptors and the ordered chain built from config.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::model::{ConfigFile, StageConfig};
use crate::errors::{FlowchainError, Result};
use crate::types::StageName;

/// How a stage is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A command line handed to `sh -c` (or `cmd /C` on Windows).
    Shell(String),
    /// A program executed directly with an explicit argument vector.
    Program { program: String, args: Vec<String> },
}

impl Invocation {
    /// `cmd` alone is a shell line; `cmd` + `args` is a direct exec.
    pub fn from_parts(cmd: &str, args: Option<&[String]>) -> Self {
        match args {
            Some(args) => Invocation::Program {
                program: cmd.to_string(),
                args: args.to_vec(),
            },
            None => Invocation::Shell(cmd.to_string()),
        }
    }

    /// Program + argv as the OS will see it.
    pub fn argv(&self) -> (String, Vec<String>) {
        match self {
            Invocation::Shell(line) if cfg!(windows) => {
                ("cmd".to_string(), vec!["/C".to_string(), line.clone()])
            }
            Invocation::Shell(line) => ("sh".to_string(), vec!["-c".to_string(), line.clone()]),
            Invocation::Program { program, args } => (program.clone(), args.clone()),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Shell(line) => write!(f, "{line}"),
            Invocation::Program { program, args } => {
                write!(f, "{program}")?;
                for arg in args {
                    if arg.is_empty() || arg.contains(char::is_whitespace) {
                        write!(f, " \"{arg}\"")?;
                    } else {
                        write!(f, " {arg}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// One stage of the chain. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: StageName,
    pub invocation: Invocation,
    pub description: String,
}

impl StageDescriptor {
    pub fn new(name: impl Into<StageName>, invocation: Invocation) -> Self {
        Self {
            name: name.into(),
            invocation,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn from_config(name: &str, cfg: &StageConfig) -> Self {
        Self {
            name: name.to_string(),
            invocation: Invocation::from_parts(&cfg.cmd, cfg.args.as_deref()),
            description: cfg.description.clone().unwrap_or_default(),
        }
    }
}

/// Fixed, totally ordered sequence of stages.
///
/// Sub-chains produced by [`ChainPlan::starting_at`] and
/// [`ChainPlan::single`] are new, shorter chain instances; nothing about a
/// previous run is carried over.
#[derive(Debug, Clone)]
pub struct ChainPlan {
    stages: Vec<StageDescriptor>,
    heads: BTreeSet<StageName>,
}

impl ChainPlan {
    /// Build a plan from stages in execution order. The first stage is the
    /// chain head.
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        let heads = stages.first().map(|s| s.name.clone()).into_iter().collect();
        Self { stages, heads }
    }

    /// Additionally treat `name` as a head for manual runs.
    pub fn with_head(mut self, name: impl Into<StageName>) -> Self {
        self.heads.insert(name.into());
        self
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut plan = Self::new(
            cfg.stage_order()
                .iter()
                .filter_map(|name| {
                    cfg.stage
                        .get(name)
                        .map(|stage| StageDescriptor::from_config(name, stage))
                })
                .collect(),
        );
        for (name, stage) in cfg.stage.iter() {
            if stage.head {
                plan.heads.insert(name.clone());
            }
        }
        plan
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn head(&self) -> Option<&StageDescriptor> {
        self.stages.first()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn is_head(&self, name: &str) -> bool {
        self.heads.contains(name)
    }

    /// The tail of the chain beginning at `name`.
    pub fn starting_at(&self, name: &str) -> Result<ChainPlan> {
        let idx = self
            .position(name)
            .ok_or_else(|| FlowchainError::StageNotFound(name.to_string()))?;
        Ok(Self::new(self.stages[idx..].to_vec()))
    }

    /// A one-stage chain containing only `name`.
    pub fn single(&self, name: &str) -> Result<ChainPlan> {
        let idx = self
            .position(name)
            .ok_or_else(|| FlowchainError::StageNotFound(name.to_string()))?;
        Ok(Self::new(vec![self.stages[idx].clone()]))
    }

    /// Plan for an operator running one stage by hand.
    ///
    /// Head stages continue down the chain unless `only` is set; every other
    /// stage runs alone. Earlier stages are never included.
    pub fn manual(&self, name: &str, only: bool) -> Result<ChainPlan> {
        if self.is_head(name) && !only {
            self.starting_at(name)
        } else {
            self.single(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ChainPlan {
        ChainPlan::new(vec![
            StageDescriptor::new("acquisition", Invocation::Shell("echo a".into())),
            StageDescriptor::new("prepare", Invocation::Shell("echo p".into())),
            StageDescriptor::new("process", Invocation::Shell("echo x".into())),
        ])
    }

    #[test]
    fn starting_at_drops_earlier_stages() {
        let tail = plan().starting_at("prepare").unwrap();
        assert_eq!(tail.stage_names(), vec!["prepare", "process"]);
        assert_eq!(tail.head().unwrap().name, "prepare");
    }

    #[test]
    fn unknown_stage_is_an_error() {
        assert!(matches!(
            plan().starting_at("nope"),
            Err(FlowchainError::StageNotFound(ref n)) if n == "nope"
        ));
        assert!(plan().single("nope").is_err());
    }

    #[test]
    fn manual_run_of_head_follows_the_chain() {
        let p = plan();
        assert_eq!(
            p.manual("acquisition", false).unwrap().stage_names(),
            vec!["acquisition", "prepare", "process"]
        );
        assert_eq!(
            p.manual("acquisition", true).unwrap().stage_names(),
            vec!["acquisition"]
        );
        assert_eq!(p.manual("prepare", false).unwrap().stage_names(), vec!["prepare"]);

        let p = p.with_head("prepare");
        assert_eq!(
            p.manual("prepare", false).unwrap().stage_names(),
            vec!["prepare", "process"]
        );
    }

    #[test]
    fn invocation_forms() {
        let direct = Invocation::from_parts(
            "python",
            Some(&["-m".to_string(), "flows.prepare batch".to_string()][..]),
        );
        assert_eq!(direct.to_string(), "python -m \"flows.prepare batch\"");
        let (program, args) = direct.argv();
        assert_eq!(program, "python");
        assert_eq!(args.len(), 2);

        let shell = Invocation::from_parts("python -m flows.prepare_batch_flow", None);
        let (program, args) = shell.argv();
        if cfg!(windows) {
            assert_eq!(program, "cmd");
        } else {
            assert_eq!(program, "sh");
            assert_eq!(args[0], "-c");
        }
    }
}
