use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use taskdeck_core::{AppConfig, CliError, Dashboard, Session, TaskRunner};
use tokio::process::Command;

use crate::plan::{Plan, PlannedTask};

use super::cli::RunArgs;

/// `taskdeck run <plan>`: every leaf in order, shell commands as bodies.
pub async fn run(args: RunArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let plan = Plan::load(&args.plan)?;
    let session = Session::new(cfg.render.clone());
    tracing::info!(session_id = %session.id(), plan = %args.plan.display(), "run started");

    let runner = TaskRunner::new(session.clone());
    let dashboard = Dashboard::new(session);
    runner.add_tasks(plan.tasks());

    tokio::select! {
        code = run_plan(&runner, &dashboard, &plan, args.continue_on_error) => Ok(code),
        _ = tokio::signal::ctrl_c() => {
            runner.error(&anyhow::anyhow!("interrupted")).await;
            Ok(130)
        }
    }
}

async fn run_plan(
    runner: &TaskRunner,
    dashboard: &Dashboard,
    plan: &Plan,
    continue_on_error: bool,
) -> i32 {
    for task in plan.leaves() {
        let PlannedTask { id, command, skip } = task;
        if let Some(reason) = skip {
            runner.skip_task(&id, Some(reason));
            continue;
        }
        let Some(command) = command else {
            continue;
        };

        let body = || shell_step(command, plan.cwd.clone(), dashboard.clone(), id.clone());
        if let Err(err) = runner.run_task(&id, body, continue_on_error).await {
            runner.error(&anyhow::Error::new(err)).await;
            return 1;
        }
    }

    let summary = runner.complete().await;
    if summary.success() {
        0
    } else {
        1
    }
}

/// Runs `command` through the shell and keeps its output as the task's tail.
async fn shell_step(
    command: String,
    cwd: Option<PathBuf>,
    dashboard: Dashboard,
    id: String,
) -> anyhow::Result<()> {
    let mut cmd = shell(&command);
    if let Some(cwd) = &cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to start `{command}`"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().chain(stderr.lines()) {
        dashboard.add_output(id.as_str(), line);
    }

    match output.status.code() {
        Some(0) => Ok(()),
        Some(code) => anyhow::bail!("`{command}` exited with status {code}"),
        None => anyhow::bail!("`{command}` was terminated by a signal"),
    }
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}
