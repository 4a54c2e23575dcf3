#![allow(dead_code)]

use std::sync::Arc;

use taskdeck_core::render::MemorySink;
use taskdeck_core::{LogClassifier, LogEvent, RenderConfig, ReporterKind, Session, Task, TaskRunner, TaskStatus};

/// Three leaves A, B, C behind a session that records its output.
pub fn abc_runner(kind: ReporterKind) -> (TaskRunner, MemorySink) {
    let config = RenderConfig {
        ascii: true,
        color: false,
        ..RenderConfig::default()
    };
    let (session, sink) = Session::in_memory(config, kind);
    let runner = TaskRunner::new(session);
    runner.add_tasks([
        Task::leaf("a", "A"),
        Task::leaf("b", "B"),
        Task::leaf("c", "C"),
    ]);
    (runner, sink)
}

pub fn status_of(session: &Arc<Session>, id: &str) -> Option<TaskStatus> {
    session.read(|tree| tree.find_task(id).map(Task::status))
}

pub fn statuses(session: &Arc<Session>, ids: &[&str]) -> Vec<Option<TaskStatus>> {
    ids.iter().map(|id| status_of(session, id)).collect()
}

pub fn events_from_str(classifier: &mut LogClassifier, input: &str) -> Vec<LogEvent> {
    input
        .lines()
        .filter_map(|line| classifier.classify(line).event)
        .collect()
}
