//! The render session: owns the task tree, the error buffer, captured output
//! and the reporter for one command invocation.
//!
//! All mutations go through [`Session::mutate`] or [`Session::batch`], which
//! hold the state lock only for the synchronous change and hand the resulting
//! transitions to the reporter after releasing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::executor::ErrorCollector;
use crate::render::{
    select_reporter, InteractiveReporter, PlainReporter, Reporter, ReporterKind, SessionEnd,
};
use crate::render::sink::{FrameSink, MemorySink};
use crate::task::{StatusChange, TaskTree};
use crate::util::RingLines;

/// Reasons a repaint must not happen right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderGate {
    pub silent: bool,
    pub batch_depth: usize,
    pub failed: bool,
    pub finished: bool,
}

impl RenderGate {
    pub fn suppressed(&self) -> bool {
        self.silent || self.batch_depth > 0 || self.failed || self.finished
    }
}

/// Captured raw output per task, plus the `system` sink.
#[derive(Debug, Clone)]
pub struct OutputTails {
    cap: usize,
    system: RingLines,
    tasks: HashMap<String, RingLines>,
}

impl OutputTails {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            system: RingLines::new(cap),
            tasks: HashMap::new(),
        }
    }

    pub fn push_task(&mut self, id: &str, line: &str) {
        self.tasks
            .entry(id.to_string())
            .or_insert_with(|| RingLines::new(self.cap))
            .push(line);
    }

    pub fn push_system(&mut self, line: &str) {
        self.system.push(line);
    }

    pub fn task(&self, id: &str) -> Option<&RingLines> {
        self.tasks.get(id)
    }

    pub fn system(&self) -> &RingLines {
        &self.system
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub tree: TaskTree,
    pub errors: ErrorCollector,
    pub outputs: OutputTails,
    pub gate: RenderGate,
}

impl SessionState {
    pub fn new(cfg: &RenderConfig) -> Self {
        Self {
            tree: TaskTree::new(),
            errors: ErrorCollector::new(),
            outputs: OutputTails::new(cfg.output_tail_lines),
            gate: RenderGate {
                silent: cfg.silent,
                ..RenderGate::default()
            },
        }
    }
}

pub type SharedState = Arc<Mutex<SessionState>>;

/// Locks the state, recovering from a poisoned lock: a panicked task body
/// must not take the renderer down with it.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Session {
    id: String,
    config: RenderConfig,
    state: SharedState,
    reporter: Box<dyn Reporter>,
}

impl Session {
    /// Picks the reporter from the configuration and the attached terminal.
    ///
    /// Must be called inside a Tokio runtime: the interactive reporter spawns
    /// its render loop immediately.
    pub fn new(config: RenderConfig) -> Arc<Self> {
        let state = Arc::new(Mutex::new(SessionState::new(&config)));
        let reporter = select_reporter(&config, state.clone());
        Self::assemble(config, state, reporter)
    }

    /// Uses the given reporter kind and sink instead of detecting them.
    pub fn with_sink(
        config: RenderConfig,
        kind: ReporterKind,
        sink: Box<dyn FrameSink>,
    ) -> Arc<Self> {
        let state = Arc::new(Mutex::new(SessionState::new(&config)));
        let reporter: Box<dyn Reporter> = match kind {
            ReporterKind::Interactive => {
                Box::new(InteractiveReporter::spawn(&config, state.clone(), sink))
            }
            ReporterKind::Plain => Box::new(PlainReporter::new(&config, sink)),
        };
        Self::assemble(config, state, reporter)
    }

    /// A session whose output is recorded in memory.
    pub fn in_memory(config: RenderConfig, kind: ReporterKind) -> (Arc<Self>, MemorySink) {
        let sink = MemorySink::new();
        let session = Self::with_sink(config, kind, Box::new(sink.clone()));
        (session, sink)
    }

    fn assemble(config: RenderConfig, state: SharedState, reporter: Box<dyn Reporter>) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        info!(session_id = %id, reporter = ?reporter.kind(), "render session started");
        Arc::new(Self {
            id,
            config,
            state,
            reporter,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn reporter_kind(&self) -> ReporterKind {
        self.reporter.kind()
    }

    /// Read-only access to the tree.
    pub fn read<R>(&self, f: impl FnOnce(&TaskTree) -> R) -> R {
        f(&lock_state(&self.state).tree)
    }

    /// Access to the whole state without reporting; for errors and output.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut lock_state(&self.state))
    }

    /// Applies one mutation and reports its transitions.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut TaskTree) -> R) -> R {
        let (out, changes) = {
            let mut state = lock_state(&self.state);
            let out = f(&mut state.tree);
            (out, state.tree.take_changes())
        };
        // Titles and new tasks journal nothing but still need a repaint.
        self.trace_changes(&changes);
        self.reporter.on_change(&changes);
        out
    }

    /// Applies several mutations with renders held back, then reports once.
    pub fn batch<R>(&self, f: impl FnOnce(&mut TaskTree) -> R) -> R {
        let (out, changes) = {
            let mut state = lock_state(&self.state);
            state.gate.batch_depth += 1;
            let out = f(&mut state.tree);
            state.gate.batch_depth -= 1;
            (out, state.tree.take_changes())
        };
        self.trace_changes(&changes);
        self.reporter.on_batch(&changes);
        out
    }

    /// Stops timers, writes the final frame and closes the gate for good.
    pub async fn finish(&self, end: SessionEnd) {
        {
            let mut state = lock_state(&self.state);
            match end {
                SessionEnd::Completed => state.gate.finished = true,
                SessionEnd::Failed => state.gate.failed = true,
            }
        }
        self.reporter.finish(end).await;
        info!(session_id = %self.id, ?end, "render session stopped");
    }

    /// Writes text below the live region (banners, summaries).
    pub fn print(&self, text: &str) {
        self.reporter.print(text);
    }

    fn trace_changes(&self, changes: &[StatusChange]) {
        for change in changes {
            debug!(
                session_id = %self.id,
                task = %change.id,
                stage = change.stage,
                from = %change.previous,
                to = %change.status,
                "status transition"
            );
        }
    }
}
