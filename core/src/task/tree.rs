use crate::error::TaskError;

use super::model::{Task, TaskKind, TaskStatus};

/// One applied status transition, leaf or derived stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: String,
    pub title: String,
    pub previous: TaskStatus,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub stage: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTally {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusTally {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.skipped
    }
}

/// Position of a task: top-level index plus an optional child index.
#[derive(Debug, Clone, Copy)]
struct Slot {
    top: usize,
    child: Option<usize>,
}

/// Ordered stages and leaves for one invocation.
///
/// Every applied transition is appended to a journal that the session drains
/// after each mutation to feed the reporter.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    tasks: Vec<Task>,
    journal: Vec<StatusChange>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.tasks.extend(tasks);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Searches the top level, then one level of children. First match wins.
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.locate(id).and_then(|slot| self.at(slot))
    }

    /// Applies a status change. Returns `Ok(false)` when the status is unchanged.
    ///
    /// Moving a leaf to `Running` demotes every other running leaf to `Pending`.
    pub fn update_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        message: Option<String>,
    ) -> Result<bool, TaskError> {
        let slot = self.leaf_slot(id, "stage status is derived from its children")?;
        if self.at(slot).map(Task::status) == Some(status) {
            return Ok(false);
        }

        let stages_before = self.stage_statuses();

        // The target is not running yet, so every running leaf is someone else.
        if status == TaskStatus::Running {
            let mut demoted = Vec::new();
            for task in &mut self.tasks {
                demote_running(task, &mut demoted);
            }
            self.journal.extend(demoted);
        }

        let task = self
            .at_mut(slot)
            .ok_or_else(|| TaskError::UnknownTask(id.to_string()))?;
        let previous = task.status();
        if let TaskKind::Leaf {
            status: current,
            message: current_message,
        } = &mut task.kind
        {
            *current = status;
            *current_message = message.clone();
        }
        let change = StatusChange {
            id: task.id.clone(),
            title: task.title.clone(),
            previous,
            status,
            message,
            stage: false,
        };
        self.journal.push(change);

        self.journal_stage_changes(&stages_before);
        Ok(true)
    }

    pub fn set_message(&mut self, id: &str, message: Option<String>) -> Result<(), TaskError> {
        let slot = self.leaf_slot(id, "stages carry no message")?;
        if let Some(TaskKind::Leaf {
            message: current, ..
        }) = self.at_mut(slot).map(|t| &mut t.kind)
        {
            *current = message;
        }
        Ok(())
    }

    pub fn set_title(&mut self, id: &str, title: impl Into<String>) -> Result<(), TaskError> {
        let task = self
            .locate(id)
            .and_then(|slot| self.at_mut(slot))
            .ok_or_else(|| TaskError::UnknownTask(id.to_string()))?;
        task.title = title.into();
        Ok(())
    }

    pub fn running_task(&self) -> Option<&Task> {
        self.leaves()
            .into_iter()
            .find(|t| t.status() == TaskStatus::Running)
    }

    pub fn has_running(&self) -> bool {
        self.running_task().is_some()
    }

    pub fn any_failed(&self) -> bool {
        self.leaves()
            .iter()
            .any(|t| t.status() == TaskStatus::Failed)
    }

    /// All leaves, depth first, in display order.
    pub fn leaves(&self) -> Vec<&Task> {
        let mut out = Vec::new();
        for task in &self.tasks {
            collect_leaves(task, &mut out);
        }
        out
    }

    pub fn tally(&self) -> StatusTally {
        let mut tally = StatusTally::default();
        for leaf in self.leaves() {
            tally.add(leaf.status());
        }
        tally
    }

    pub fn take_changes(&mut self) -> Vec<StatusChange> {
        std::mem::take(&mut self.journal)
    }

    fn locate(&self, id: &str) -> Option<Slot> {
        if let Some(top) = self.tasks.iter().position(|t| t.id == id) {
            return Some(Slot { top, child: None });
        }
        self.tasks.iter().enumerate().find_map(|(top, task)| {
            task.children()
                .iter()
                .position(|c| c.id == id)
                .map(|child| Slot {
                    top,
                    child: Some(child),
                })
        })
    }

    fn leaf_slot(&self, id: &str, reason: &'static str) -> Result<Slot, TaskError> {
        let slot = self
            .locate(id)
            .ok_or_else(|| TaskError::UnknownTask(id.to_string()))?;
        if self.at(slot).is_some_and(Task::is_stage) {
            return Err(TaskError::InvalidOperation {
                id: id.to_string(),
                reason,
            });
        }
        Ok(slot)
    }

    fn at(&self, slot: Slot) -> Option<&Task> {
        let top = self.tasks.get(slot.top)?;
        match slot.child {
            Some(child) => top.children().get(child),
            None => Some(top),
        }
    }

    fn at_mut(&mut self, slot: Slot) -> Option<&mut Task> {
        let top = self.tasks.get_mut(slot.top)?;
        match slot.child {
            Some(child) => top.children_mut()?.get_mut(child),
            None => Some(top),
        }
    }

    fn stage_statuses(&self) -> Vec<Option<TaskStatus>> {
        self.tasks
            .iter()
            .map(|t| t.is_stage().then(|| t.status()))
            .collect()
    }

    fn journal_stage_changes(&mut self, before: &[Option<TaskStatus>]) {
        for (task, previous) in self.tasks.iter().zip(before) {
            let Some(previous) = *previous else {
                continue;
            };
            let status = task.status();
            if status != previous {
                self.journal.push(StatusChange {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    previous,
                    status,
                    message: None,
                    stage: true,
                });
            }
        }
    }
}

fn collect_leaves<'a>(task: &'a Task, out: &mut Vec<&'a Task>) {
    match &task.kind {
        TaskKind::Leaf { .. } => out.push(task),
        TaskKind::Stage { children } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}

fn demote_running(task: &mut Task, demoted: &mut Vec<StatusChange>) {
    match &mut task.kind {
        TaskKind::Leaf { status, message } => {
            if *status == TaskStatus::Running {
                *status = TaskStatus::Pending;
                demoted.push(StatusChange {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    previous: TaskStatus::Running,
                    status: TaskStatus::Pending,
                    message: message.clone(),
                    stage: false,
                });
            }
        }
        TaskKind::Stage { children } => {
            for child in children {
                demote_running(child, demoted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> TaskTree {
        let mut tree = TaskTree::new();
        tree.add_task(Task::leaf("prepare", "Prepare"));
        tree.add_task(Task::stage(
            "generate",
            "Generate",
            [Task::leaf("templates", "Templates"), Task::leaf("deps", "Dependencies")],
        ));
        tree.add_task(Task::leaf("finish", "Finish"));
        tree
    }

    fn running_count(tree: &TaskTree) -> usize {
        tree.leaves()
            .iter()
            .filter(|t| t.status() == TaskStatus::Running)
            .count()
    }

    #[test]
    fn finds_top_level_and_children() {
        let tree = sample();
        assert_eq!(tree.find_task("prepare").map(|t| t.title.as_str()), Some("Prepare"));
        assert_eq!(tree.find_task("deps").map(|t| t.title.as_str()), Some("Dependencies"));
        assert!(tree.find_task("generate").is_some_and(Task::is_stage));
        assert!(tree.find_task("missing").is_none());
    }

    #[test]
    fn duplicate_ids_resolve_to_first_match() {
        let mut tree = TaskTree::new();
        tree.add_task(Task::leaf("dup", "First"));
        tree.add_task(Task::leaf("dup", "Second"));
        assert_eq!(tree.find_task("dup").map(|t| t.title.as_str()), Some("First"));
    }

    #[test]
    fn unchanged_status_is_a_noop() {
        let mut tree = sample();
        assert!(!tree.update_status("prepare", TaskStatus::Pending, None).unwrap());
        assert!(tree.take_changes().is_empty());
    }

    #[test]
    fn starting_a_task_demotes_the_previous_runner() {
        let mut tree = sample();
        tree.update_status("prepare", TaskStatus::Running, None).unwrap();
        tree.take_changes();

        tree.update_status("deps", TaskStatus::Running, None).unwrap();
        assert_eq!(tree.find_task("prepare").unwrap().status(), TaskStatus::Pending);
        assert_eq!(tree.find_task("deps").unwrap().status(), TaskStatus::Running);

        let changes = tree.take_changes();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.id.as_str(), c.status, c.stage))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("prepare", TaskStatus::Pending, false),
                ("deps", TaskStatus::Running, false),
                ("generate", TaskStatus::Running, true),
            ]
        );
    }

    #[test]
    fn demotion_reaches_into_stages() {
        let mut tree = sample();
        tree.update_status("templates", TaskStatus::Running, None).unwrap();
        tree.update_status("finish", TaskStatus::Running, None).unwrap();
        assert_eq!(tree.find_task("templates").unwrap().status(), TaskStatus::Pending);
        assert_eq!(tree.find_task("generate").unwrap().status(), TaskStatus::Pending);
    }

    #[test]
    fn at_most_one_task_runs_for_any_update_sequence() {
        let ids = ["prepare", "templates", "deps", "finish"];
        let mut tree = sample();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let id = ids[(seed % ids.len() as u64) as usize];
            let status = TaskStatus::ALL[((seed >> 8) % 5) as usize];
            tree.update_status(id, status, None).unwrap();
            assert!(running_count(&tree) <= 1);
        }
    }

    #[test]
    fn stage_status_cannot_be_set() {
        let mut tree = sample();
        let err = tree
            .update_status("generate", TaskStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidOperation { .. }));
    }

    #[test]
    fn unknown_task_is_reported() {
        let mut tree = sample();
        let err = tree
            .update_status("nope", TaskStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask(id) if id == "nope"));
    }

    #[test]
    fn stage_completion_is_journaled_once() {
        let mut tree = sample();
        tree.update_status("templates", TaskStatus::Completed, None).unwrap();
        tree.update_status("deps", TaskStatus::Skipped, Some("offline".into()))
            .unwrap();
        let stage_changes: Vec<_> = tree
            .take_changes()
            .into_iter()
            .filter(|c| c.stage)
            .collect();
        assert_eq!(stage_changes.len(), 1);
        assert_eq!(stage_changes[0].status, TaskStatus::Completed);
        assert_eq!(tree.find_task("deps").unwrap().message(), Some("offline"));
    }

    #[test]
    fn tally_counts_leaves_only() {
        let mut tree = sample();
        tree.update_status("prepare", TaskStatus::Completed, None).unwrap();
        tree.update_status("deps", TaskStatus::Failed, Some("boom".into()))
            .unwrap();
        let tally = tree.tally();
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.completed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.pending, 2);
        assert!(tree.any_failed());
    }
}
