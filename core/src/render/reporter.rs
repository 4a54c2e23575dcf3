use async_trait::async_trait;

use crate::config::RenderConfig;
use crate::session::SharedState;
use crate::task::{StatusChange, TaskStatus};

use super::frame::{FrameBuilder, Glyphs};
use super::scheduler::{lock_fallback, RenderScheduler, RenderTiming, SharedFallback};
use super::sink::{shared, FrameSink, PlainSink, SharedSink, TerminalSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterKind {
    Interactive,
    Plain,
}

impl ReporterKind {
    /// Plain output when asked for, under CI, or when stdout is not a terminal.
    pub fn detect(cfg: &RenderConfig) -> Self {
        let ci = std::env::var_os("CI").is_some();
        if cfg.simple_progress || ci || !atty::is(atty::Stream::Stdout) {
            ReporterKind::Plain
        } else {
            ReporterKind::Interactive
        }
    }
}

/// How a session ended; decides which render gate closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    Failed,
}

/// Receives every batch of transitions a session applies.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn kind(&self) -> ReporterKind;

    /// One mutation's transitions.
    fn on_change(&self, changes: &[StatusChange]);

    /// The transitions of a whole batch; exactly one render follows.
    fn on_batch(&self, changes: &[StatusChange]);

    /// Stops timers and leaves the output ready for a banner or summary.
    async fn finish(&self, end: SessionEnd);

    /// Writes text below the live region.
    fn print(&self, text: &str);
}

pub fn select_reporter(cfg: &RenderConfig, state: SharedState) -> Box<dyn Reporter> {
    match ReporterKind::detect(cfg) {
        ReporterKind::Interactive => Box::new(InteractiveReporter::spawn(
            cfg,
            state,
            Box::new(TerminalSink::stdout()),
        )),
        ReporterKind::Plain => Box::new(PlainReporter::new(cfg, Box::new(PlainSink::stdout()))),
    }
}

/// One line for a finished task: `✔ Install`, `✖ Build (exit 1)`.
pub fn plain_line(glyphs: &Glyphs, change: &StatusChange) -> Option<String> {
    if !matches!(change.status, TaskStatus::Completed | TaskStatus::Failed) {
        return None;
    }
    let mut line = format!("{} {}", glyphs.status(change.status), change.title);
    if change.status == TaskStatus::Failed {
        if let Some(message) = change.message.as_deref().filter(|m| !m.is_empty()) {
            line.push_str(&format!(" ({message})"));
        }
    }
    Some(line)
}

fn println_all(sink: &SharedSink, text: &str) {
    let mut sink = sink.lock().unwrap_or_else(|p| p.into_inner());
    for line in text.lines() {
        if let Err(e) = sink.println(line) {
            tracing::debug!(error = %e, "dropped output line");
            return;
        }
    }
}

/// Live frame redrawn in place by a [`RenderScheduler`].
///
/// After a failed terminal write it degrades to the plain line format on the
/// same sink for the rest of the session, starting with the transitions the
/// failed frame should have shown.
pub struct InteractiveReporter {
    scheduler: RenderScheduler,
    sink: SharedSink,
    glyphs: Glyphs,
    silent: bool,
    fallback: SharedFallback,
}

impl InteractiveReporter {
    pub fn spawn(cfg: &RenderConfig, state: SharedState, sink: Box<dyn FrameSink>) -> Self {
        let sink = shared(sink);
        let fallback = SharedFallback::default();
        let builder = FrameBuilder::from_config(cfg);
        let glyphs = builder.glyphs().clone();
        let scheduler = RenderScheduler::spawn(
            state,
            sink.clone(),
            builder,
            RenderTiming::from_config(cfg),
            fallback.clone(),
        );
        Self {
            scheduler,
            sink,
            glyphs,
            silent: cfg.silent,
            fallback,
        }
    }

    pub fn is_degraded(&self) -> bool {
        lock_fallback(&self.fallback).is_degraded()
    }

    /// Queues the plain lines of `changes` for replay, or prints them once
    /// degraded. Returns whether a repaint should be requested.
    fn record(&self, changes: &[StatusChange]) -> bool {
        let lines: Vec<String> = if self.silent {
            Vec::new()
        } else {
            changes
                .iter()
                .filter_map(|c| plain_line(&self.glyphs, c))
                .collect()
        };
        let mut fallback = lock_fallback(&self.fallback);
        if !fallback.is_degraded() {
            fallback.queue(lines);
            return true;
        }
        for line in lines {
            println_all(&self.sink, &line);
        }
        false
    }
}

#[async_trait]
impl Reporter for InteractiveReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::Interactive
    }

    fn on_change(&self, changes: &[StatusChange]) {
        if self.record(changes) {
            self.scheduler.invalidate();
        }
    }

    fn on_batch(&self, changes: &[StatusChange]) {
        if self.record(changes) {
            self.scheduler.render_now();
        }
    }

    async fn finish(&self, _end: SessionEnd) {
        self.scheduler.stop().await;
    }

    fn print(&self, text: &str) {
        println_all(&self.sink, text);
    }
}

/// One uncoloured line per completed or failed transition. No timers, no
/// control sequences.
pub struct PlainReporter {
    sink: SharedSink,
    glyphs: Glyphs,
    silent: bool,
}

impl PlainReporter {
    pub fn new(cfg: &RenderConfig, sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink: shared(sink),
            glyphs: Glyphs::for_config(cfg),
            silent: cfg.silent,
        }
    }

    fn report(&self, changes: &[StatusChange]) {
        if self.silent {
            return;
        }
        for line in changes.iter().filter_map(|c| plain_line(&self.glyphs, c)) {
            println_all(&self.sink, &line);
        }
    }
}

#[async_trait]
impl Reporter for PlainReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::Plain
    }

    fn on_change(&self, changes: &[StatusChange]) {
        self.report(changes);
    }

    fn on_batch(&self, changes: &[StatusChange]) {
        self.report(changes);
    }

    async fn finish(&self, _end: SessionEnd) {
        let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = sink.finish() {
            tracing::debug!(error = %e, "failed to flush plain output");
        }
    }

    fn print(&self, text: &str) {
        println_all(&self.sink, text);
    }
}
