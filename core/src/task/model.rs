use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Skipped,
    ];

    /// Completed or skipped: nothing left to do.
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage only groups; a leaf is the unit that runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Stage {
        children: Vec<Task>,
    },
    Leaf {
        status: TaskStatus,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub kind: TaskKind,
}

impl Task {
    pub fn leaf(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: TaskKind::Leaf {
                status: TaskStatus::Pending,
                message: None,
            },
        }
    }

    pub fn stage(
        id: impl Into<String>,
        title: impl Into<String>,
        children: impl IntoIterator<Item = Task>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: TaskKind::Stage {
                children: children.into_iter().collect(),
            },
        }
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.kind, TaskKind::Stage { .. })
    }

    /// Leaf status as stored, stage status as derived from its children.
    pub fn status(&self) -> TaskStatus {
        match &self.kind {
            TaskKind::Leaf { status, .. } => *status,
            TaskKind::Stage { children } => aggregate_status(children.iter().map(Task::status)),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Leaf { message, .. } => message.as_deref(),
            TaskKind::Stage { .. } => None,
        }
    }

    pub fn children(&self) -> &[Task] {
        match &self.kind {
            TaskKind::Stage { children } => children,
            TaskKind::Leaf { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Task>> {
        match &mut self.kind {
            TaskKind::Stage { children } => Some(children),
            TaskKind::Leaf { .. } => None,
        }
    }
}

/// Stage aggregation, fixed priority: failed > running > all done > pending.
///
/// A stage without children stays pending.
pub fn aggregate_status<I>(statuses: I) -> TaskStatus
where
    I: IntoIterator<Item = TaskStatus>,
{
    let mut any_running = false;
    let mut all_done = true;
    let mut empty = true;

    for status in statuses {
        empty = false;
        match status {
            TaskStatus::Failed => return TaskStatus::Failed,
            TaskStatus::Running => any_running = true,
            TaskStatus::Pending => all_done = false,
            TaskStatus::Completed | TaskStatus::Skipped => {}
        }
    }

    if any_running {
        TaskStatus::Running
    } else if all_done && !empty {
        TaskStatus::Completed
    } else {
        TaskStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(children: &[TaskStatus]) -> TaskStatus {
        if children.contains(&TaskStatus::Failed) {
            TaskStatus::Failed
        } else if children.contains(&TaskStatus::Running) {
            TaskStatus::Running
        } else if children.iter().all(|s| s.is_done()) {
            TaskStatus::Completed
        } else {
            TaskStatus::Pending
        }
    }

    #[test]
    fn aggregation_matches_priority_for_every_three_child_combination() {
        for a in TaskStatus::ALL {
            for b in TaskStatus::ALL {
                for c in TaskStatus::ALL {
                    let children = [a, b, c];
                    assert_eq!(
                        aggregate_status(children),
                        expected(&children),
                        "children {children:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn failed_beats_running_regardless_of_order() {
        assert_eq!(
            aggregate_status([TaskStatus::Running, TaskStatus::Failed]),
            TaskStatus::Failed
        );
        assert_eq!(
            aggregate_status([TaskStatus::Failed, TaskStatus::Running]),
            TaskStatus::Failed
        );
    }

    #[test]
    fn skipped_counts_as_done() {
        assert_eq!(
            aggregate_status([TaskStatus::Skipped, TaskStatus::Completed]),
            TaskStatus::Completed
        );
        assert_eq!(
            aggregate_status([TaskStatus::Skipped, TaskStatus::Pending]),
            TaskStatus::Pending
        );
    }

    #[test]
    fn empty_stage_is_pending() {
        let stage = Task::stage("s", "Stage", Vec::new());
        assert_eq!(stage.status(), TaskStatus::Pending);
    }

    #[test]
    fn stage_status_is_derived() {
        let mut done = Task::leaf("a", "A");
        if let TaskKind::Leaf { status, .. } = &mut done.kind {
            *status = TaskStatus::Completed;
        }
        let stage = Task::stage("s", "Stage", [done, Task::leaf("b", "B")]);
        assert!(stage.is_stage());
        assert_eq!(stage.status(), TaskStatus::Pending);
        assert_eq!(stage.message(), None);
        assert_eq!(stage.children().len(), 2);
    }
}
