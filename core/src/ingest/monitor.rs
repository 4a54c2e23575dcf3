use std::process::Stdio;

use futures::future::join_all;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::classify::{LogClassifier, LogEvent, LogEventKind};
use crate::config::ProcessConfig;
use crate::error::RunnerError;
use crate::task::TaskStatus;

use super::dashboard::{Dashboard, TaskPatch};
use super::diagnostics::DiagnosticLog;
use super::io_pump::{pump_lines, LineStream, LineTap};

pub const CACHED_MESSAGE: &str = "cached";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorExit {
    pub exit_code: i32,
    pub lines: u64,
}

impl MonitorExit {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Aborts the pump tasks if the monitor is dropped mid-run.
struct PumpGuard(Vec<JoinHandle<Result<u64, RunnerError>>>);

impl PumpGuard {
    fn take(&mut self) -> Vec<JoinHandle<Result<u64, RunnerError>>> {
        std::mem::take(&mut self.0)
    }
}

impl Drop for PumpGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Drives task state from an external process's output.
pub struct ProcessMonitor {
    dashboard: Dashboard,
    classifier: LogClassifier,
    config: ProcessConfig,
    diagnostics: Option<DiagnosticLog>,
}

impl ProcessMonitor {
    /// The diagnostic file is opened only when `debug_log` is set and the
    /// session runs in debug mode.
    pub fn new(dashboard: Dashboard, classifier: LogClassifier, config: ProcessConfig) -> Self {
        let debug = dashboard.session().config().debug;
        let diagnostics = match (&config.debug_log, debug) {
            (Some(path), true) => Some(DiagnosticLog::start(path, config.line_channel_capacity)),
            _ => None,
        };
        Self {
            dashboard,
            classifier,
            config,
            diagnostics,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn classifier(&self) -> &LogClassifier {
        &self.classifier
    }

    /// Classifies one line, records it as output and applies its event.
    pub fn ingest_line(&mut self, raw: &str) -> Option<LogEvent> {
        if let Some(log) = &self.diagnostics {
            log.write(raw);
        }
        let classified = self.classifier.classify(raw);
        self.dashboard
            .add_output(classified.target.clone(), &classified.line);

        let event = classified.event?;
        tracing::debug!(task = %event.task_id, kind = event.kind.as_str(), "log event");
        self.apply(&event);
        Some(event)
    }

    fn apply(&self, event: &LogEvent) {
        let current = self
            .dashboard
            .session()
            .read(|tree| tree.find_task(&event.task_id).map(|t| t.status()));
        let patch = match event.kind {
            LogEventKind::Start => TaskPatch::status(TaskStatus::Running),
            // A failure already reported stays reported.
            LogEventKind::Complete | LogEventKind::CacheHit
                if current == Some(TaskStatus::Failed) =>
            {
                return;
            }
            LogEventKind::Complete => TaskPatch::status(TaskStatus::Completed),
            LogEventKind::CacheHit => {
                TaskPatch::status(TaskStatus::Completed).with_message(CACHED_MESSAGE)
            }
            LogEventKind::Error => {
                TaskPatch::status(TaskStatus::Failed).with_message(event.raw_line.clone())
            }
        };
        if let Err(e) = self.dashboard.update_task(&event.task_id, patch) {
            tracing::debug!(task = %event.task_id, error = %e, "log event not applied");
        }
    }

    /// Spawns `command`, feeds its output through [`Self::ingest_line`] until
    /// both streams close, then applies the exit policy.
    pub async fn run(&mut self, command: &mut Command) -> Result<MonitorExit, RunnerError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::Spawn(e.to_string()))?;
        tracing::info!(pid = ?child.id(), "process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Spawn("no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Spawn("no stderr".into()))?;

        let (line_tx, mut line_rx) =
            mpsc::channel::<LineTap>(self.config.line_channel_capacity.max(1));
        let mut pumps = PumpGuard(vec![
            pump_lines(stdout, LineStream::Stdout, line_tx.clone()),
            pump_lines(stderr, LineStream::Stderr, line_tx),
        ]);

        let mut lines = 0u64;
        while let Some(tap) = line_rx.recv().await {
            lines += 1;
            self.ingest_line(&tap.line);
        }

        for res in join_all(pumps.take()).await {
            match res {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "output stream failed"),
                Err(e) => tracing::warn!(error = %e, "output pump ended abnormally"),
            }
        }

        let status = child.wait().await.map_err(RunnerError::Wait)?;
        // Killed by a signal: report it like a generic failure.
        let exit_code = status.code().unwrap_or(-1);
        if exit_code == 0 {
            tracing::info!(lines, "process exited cleanly");
        } else {
            tracing::warn!(exit_code, lines, "process exited with failure");
        }

        self.settle(exit_code);
        if let Some(log) = self.diagnostics.take() {
            log.close().await;
        }
        Ok(MonitorExit { exit_code, lines })
    }

    /// Exit policy for tasks the output never finished.
    ///
    /// Clean exit: pending mapped leaves are assumed cached (when enabled).
    /// Failed exit: running leaves are marked failed.
    pub fn settle(&self, exit_code: i32) {
        let ids: Vec<String> = self.classifier.task_ids().map(str::to_string).collect();
        let assume_cached = self.config.assume_cached_on_success;

        let settled: Vec<(String, String, TaskStatus)> = self.dashboard.session().read(|tree| {
            ids.iter()
                .filter_map(|id| tree.find_task(id))
                .filter(|t| !t.is_stage())
                .filter_map(|t| {
                    let target = match (exit_code, t.status()) {
                        (0, TaskStatus::Pending) if assume_cached => TaskStatus::Completed,
                        (code, TaskStatus::Running) if code != 0 => TaskStatus::Failed,
                        _ => return None,
                    };
                    Some((t.id.clone(), t.title.clone(), target))
                })
                .collect()
        });
        if settled.is_empty() {
            return;
        }

        let failure = format!("exited with status {exit_code}");
        self.dashboard.session().batch(|tree| {
            for (id, _, status) in &settled {
                let message = match status {
                    TaskStatus::Failed => failure.clone(),
                    _ => CACHED_MESSAGE.to_string(),
                };
                if let Err(e) = tree.update_status(id, *status, Some(message)) {
                    tracing::debug!(task = %id, error = %e, "exit policy not applied");
                }
            }
        });

        for (id, title, status) in settled {
            if status == TaskStatus::Failed {
                self.dashboard
                    .session()
                    .with_state(|state| state.errors.add_error(&id, title, failure.clone()));
            } else {
                tracing::debug!(task = %id, "no output before clean exit, assuming cache hit");
            }
        }
    }
}
