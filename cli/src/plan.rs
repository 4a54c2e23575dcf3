//! TOML plan files for `taskdeck run`.
//!
//! ```toml
//! [[step]]
//! id = "deps"
//! title = "Install dependencies"
//! run = "npm install"
//!
//! [[step]]
//! id = "build"
//! title = "Build"
//!
//! [[step.tasks]]
//! id = "web"
//! title = "Build web"
//! run = "npm run build -w web"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use taskdeck_core::{CliError, Task};

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    /// Working directory for every command; relative to the plan file.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    /// Present: the task is marked skipped with this reason instead of run.
    #[serde(default)]
    pub skip: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Step>,
}

impl Step {
    fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// One executable leaf, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub id: String,
    pub command: Option<String>,
    pub skip: Option<String>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::Plan(format!("read {}: {e}", path.display())))?;
        let mut plan = Self::parse(&text)?;
        plan.cwd = resolve_cwd(path, plan.cwd.take());
        Ok(plan)
    }

    pub fn parse(text: &str) -> Result<Self, CliError> {
        let plan: Plan = toml::from_str(text).map_err(|e| CliError::Plan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), CliError> {
        if self.steps.is_empty() {
            return Err(CliError::Plan("plan has no steps".into()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            check_step(step, &mut seen, true)?;
            for task in &step.tasks {
                check_step(task, &mut seen, false)?;
            }
        }
        Ok(())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.steps
            .iter()
            .map(|step| {
                if step.tasks.is_empty() {
                    Task::leaf(&step.id, step.title())
                } else {
                    Task::stage(
                        &step.id,
                        step.title(),
                        step.tasks.iter().map(|t| Task::leaf(&t.id, t.title())),
                    )
                }
            })
            .collect()
    }

    pub fn leaves(&self) -> Vec<PlannedTask> {
        let mut out = Vec::new();
        for step in &self.steps {
            if step.tasks.is_empty() {
                out.push(planned(step));
            } else {
                out.extend(step.tasks.iter().map(planned));
            }
        }
        out
    }
}

/// `cwd` relative to the plan's directory. A bare file name has no directory
/// to resolve against, so the process working directory applies.
fn resolve_cwd(plan_path: &Path, cwd: Option<PathBuf>) -> Option<PathBuf> {
    let base = plan_path.parent().filter(|p| !p.as_os_str().is_empty());
    match (base, cwd) {
        (_, Some(cwd)) if cwd.is_absolute() => Some(cwd),
        (Some(base), Some(cwd)) => Some(base.join(cwd)),
        (None, Some(cwd)) => Some(cwd),
        (Some(base), None) => Some(base.to_path_buf()),
        (None, None) => None,
    }
}

fn planned(step: &Step) -> PlannedTask {
    PlannedTask {
        id: step.id.clone(),
        command: step.run.clone(),
        skip: step.skip.clone(),
    }
}

fn check_step(step: &Step, seen: &mut HashSet<String>, top: bool) -> Result<(), CliError> {
    if step.id.trim().is_empty() {
        return Err(CliError::Plan("step with empty id".into()));
    }
    if !seen.insert(step.id.clone()) {
        return Err(CliError::Plan(format!("duplicate id '{}'", step.id)));
    }
    if !top && !step.tasks.is_empty() {
        return Err(CliError::Plan(format!(
            "'{}': tasks nest one level deep",
            step.id
        )));
    }
    let is_stage = !step.tasks.is_empty();
    match (is_stage, step.run.is_some(), step.skip.is_some()) {
        (true, true, _) => Err(CliError::Plan(format!(
            "'{}': a step has either `run` or `tasks`",
            step.id
        ))),
        (false, false, false) => Err(CliError::Plan(format!(
            "'{}': nothing to run",
            step.id
        ))),
        _ => Ok(()),
    }
}
