use taskdeck_core::{
    AppConfig, CliError, Dashboard, LogClassifier, MonitorExit, ProcessMonitor, RunSummary,
    Session, SessionEnd, Task, TaskRunner,
};
use tokio::process::Command;

use super::cli::WatchArgs;

/// `taskdeck watch --task NAME... -- <cmd>`: task state read from the
/// command's own output.
pub async fn watch(args: WatchArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let specs = args.task_specs();
    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| CliError::Command("no command given".into()))?;

    let session = Session::new(cfg.render.clone());
    tracing::info!(session_id = %session.id(), program = %program, "watch started");
    let runner = TaskRunner::new(session.clone());
    runner.add_tasks(specs.iter().map(|(name, title)| Task::leaf(name, title)));

    let classifier = LogClassifier::new(specs.iter().map(|(name, _)| (name.clone(), name.clone())));
    let mut process = cfg.process.clone();
    if args.debug_log.is_some() {
        process.debug_log = args.debug_log.clone();
    }
    let mut monitor = ProcessMonitor::new(Dashboard::new(session.clone()), classifier, process);

    let mut command = Command::new(program);
    command.args(rest);

    let exit = tokio::select! {
        res = monitor.run(&mut command) => res,
        _ = tokio::signal::ctrl_c() => {
            runner.error(&anyhow::anyhow!("interrupted")).await;
            return Ok(130);
        }
    };
    let exit = match exit {
        Ok(exit) => exit,
        Err(e) => {
            session.finish(SessionEnd::Failed).await;
            return Err(e.into());
        }
    };

    let summary = runner.complete().await;
    Ok(exit_code(&exit, &summary))
}

/// The process's own failure wins; otherwise any failed task fails the run.
fn exit_code(exit: &MonitorExit, summary: &RunSummary) -> i32 {
    match exit.exit_code {
        0 if summary.success() => 0,
        0 => 1,
        code if (1..=255).contains(&code) => code,
        _ => 1,
    }
}
