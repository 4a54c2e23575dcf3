use thiserror::Error;

/// Errors raised by the task tree, the runner and the render session.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("invalid operation on '{id}': {reason}")]
    InvalidOperation { id: String, reason: &'static str },

    /// The task body returned an error. `message` is what the user sees.
    #[error("{message}")]
    TaskFailure {
        id: String,
        title: String,
        message: String,
    },

    /// A terminal write failed. Recovered locally, never returned to callers.
    #[error("render failed: {0}")]
    RenderFailure(#[source] std::io::Error),
}

impl TaskError {
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailure { .. })
    }
}
