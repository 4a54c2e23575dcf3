use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::render::{error_banner, summary_text, Glyphs, SessionEnd};
use crate::session::Session;
use crate::task::{StatusTally, Task, TaskStatus, TaskTree};

use super::collector::ErrorRecord;

/// What `run_task` reports when it returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The body failed and the run continues; the failure is buffered.
    Failed,
}

/// Final state of a run, returned by [`TaskRunner::complete`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tally: StatusTally,
    pub errors: Vec<ErrorRecord>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.tally.failed == 0
    }
}

/// Runs task bodies one at a time against a session's tree.
#[derive(Clone)]
pub struct TaskRunner {
    session: Arc<Session>,
    started: Instant,
}

impl TaskRunner {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            started: Instant::now(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn add_task(&self, task: Task) {
        self.session.mutate(|tree| tree.add_task(task));
    }

    pub fn add_tasks(&self, tasks: impl IntoIterator<Item = Task>) {
        self.session.mutate(|tree| tree.add_tasks(tasks));
    }

    /// Marks `id` running, awaits `body`, then records the outcome.
    ///
    /// A failing body is buffered either way. With `continue_on_error` unset
    /// the session is finalised and the failure is returned as
    /// [`TaskError::TaskFailure`].
    pub async fn run_task<F, Fut>(
        &self,
        id: &str,
        body: F,
        continue_on_error: bool,
    ) -> Result<TaskOutcome, TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let title = self.session.mutate(|tree| {
            tree.update_status(id, TaskStatus::Running, None)?;
            Ok::<_, TaskError>(title_of(tree, id))
        })?;
        debug!(task = %id, "task body started");

        match body().await {
            Ok(()) => {
                self.session
                    .mutate(|tree| tree.update_status(id, TaskStatus::Completed, None))?;
                Ok(TaskOutcome::Completed)
            }
            Err(err) => {
                let message = if self.session.config().debug {
                    format!("{err:#}")
                } else {
                    err.to_string()
                };
                warn!(task = %id, error = %message, continue_on_error, "task body failed");

                self.session
                    .with_state(|state| state.errors.add_error(id, &title, &message));
                self.session.mutate(|tree| {
                    tree.update_status(id, TaskStatus::Failed, Some(message.clone()))
                })?;

                if continue_on_error {
                    return Ok(TaskOutcome::Failed);
                }
                self.session.finish(SessionEnd::Failed).await;
                Err(TaskError::TaskFailure {
                    id: id.to_string(),
                    title,
                    message,
                })
            }
        }
    }

    /// Marks `id` skipped. Unknown ids and stages are logged and ignored.
    pub fn skip_task(&self, id: &str, reason: Option<String>) {
        let result = self
            .session
            .mutate(|tree| tree.update_status(id, TaskStatus::Skipped, reason));
        if let Err(e) = result {
            debug!(task = %id, error = %e, "skip ignored");
        }
    }

    /// Applies several mutations with one render afterwards.
    pub fn batch_update<R>(&self, f: impl FnOnce(&mut TaskTree) -> R) -> R {
        self.session.batch(f)
    }

    /// Final frame, timers stopped, then the summary.
    pub async fn complete(&self) -> RunSummary {
        self.session.finish(SessionEnd::Completed).await;

        let glyphs = Glyphs::for_config(self.session.config());
        let (text, tally, errors) = self.session.with_state(|state| {
            (
                summary_text(state, &glyphs),
                state.tree.tally(),
                state.errors.get_error_buffer(),
            )
        });
        self.session.print(&text);

        let summary = RunSummary {
            tally,
            errors,
            duration_ms: millis(self.started.elapsed()),
        };
        info!(
            completed = summary.tally.completed,
            failed = summary.tally.failed,
            duration_ms = summary.duration_ms,
            "run complete"
        );
        summary
    }

    /// Finalises the frame, then prints the error banner.
    pub async fn error(&self, err: &anyhow::Error) {
        self.session.finish(SessionEnd::Failed).await;
        self.session
            .print(&error_banner(err, self.session.config().debug));
    }

    pub fn error_buffer(&self) -> Vec<ErrorRecord> {
        self.session.with_state(|state| state.errors.get_error_buffer())
    }

    pub fn clear_error_buffer(&self) {
        self.session
            .with_state(|state| state.errors.clear_error_buffer());
    }
}

/// Saturates instead of truncating.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn title_of(tree: &TaskTree, id: &str) -> String {
    tree.find_task(id)
        .map(|t| t.title.clone())
        .unwrap_or_else(|| id.to_string())
}
