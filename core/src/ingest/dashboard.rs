use std::sync::Arc;

use crate::classify::OutputTarget;
use crate::error::TaskError;
use crate::session::Session;
use crate::task::TaskStatus;

/// Partial update for [`Dashboard::update_task`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub message: Option<String>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl From<&str> for OutputTarget {
    /// `"system"` names the shared sink; anything else is a task id.
    fn from(target: &str) -> Self {
        if target == Dashboard::SYSTEM {
            OutputTarget::System
        } else {
            OutputTarget::Task(target.to_string())
        }
    }
}

/// Ingestion surface for externally driven runs: raw output and task patches.
#[derive(Clone)]
pub struct Dashboard {
    session: Arc<Session>,
}

impl Dashboard {
    pub const SYSTEM: &'static str = "system";

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Appends a raw line to a task's output tail, or to the system sink.
    pub fn add_output(&self, target: impl Into<OutputTarget>, line: &str) {
        let target = target.into();
        tracing::trace!(?target, line, "output");
        self.session.with_state(|state| match &target {
            OutputTarget::Task(id) => state.outputs.push_task(id, line),
            OutputTarget::System => state.outputs.push_system(line),
        });
    }

    /// Applies `patch` as one mutation. A failed status is also buffered as an
    /// error record.
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<(), TaskError> {
        let TaskPatch {
            title,
            status,
            message,
        } = patch;

        let failed_title = self.session.mutate(|tree| {
            if tree.find_task(id).is_none() {
                return Err(TaskError::UnknownTask(id.to_string()));
            }
            let failed = match status {
                Some(status) => {
                    tree.update_status(id, status, message.clone())? && status == TaskStatus::Failed
                }
                None => {
                    if message.is_some() {
                        tree.set_message(id, message.clone())?;
                    }
                    false
                }
            };
            if let Some(title) = title {
                tree.set_title(id, title)?;
            }
            Ok(failed
                .then(|| tree.find_task(id).map(|t| t.title.clone()))
                .flatten())
        })?;

        if let Some(title) = failed_title {
            let text = message.unwrap_or_else(|| "failed".to_string());
            self.session
                .with_state(|state| state.errors.add_error(id, title, text));
        }
        Ok(())
    }

    pub fn output(&self, target: impl Into<OutputTarget>) -> Vec<String> {
        let target = target.into();
        self.session.with_state(|state| match &target {
            OutputTarget::Task(id) => state
                .outputs
                .task(id)
                .map(|ring| ring.to_vec())
                .unwrap_or_default(),
            OutputTarget::System => state.outputs.system().to_vec(),
        })
    }
}
