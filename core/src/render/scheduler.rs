use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::RenderConfig;
use crate::error::TaskError;
use crate::session::{lock_state, SharedState};

use super::frame::{FrameBuilder, RenderFrame};
use super::sink::SharedSink;

#[derive(Debug, Clone, Copy)]
pub struct RenderTiming {
    pub debounce: Duration,
    pub spinner: Duration,
}

impl RenderTiming {
    pub fn from_config(cfg: &RenderConfig) -> Self {
        Self {
            debounce: Duration::from_millis(cfg.debounce_ms),
            spinner: Duration::from_millis(cfg.spinner_interval_ms.max(1)),
        }
    }
}

/// Shared between the reporter and the render loop.
///
/// `unrendered` holds the plain lines of transitions no frame has shown yet.
/// When a draw fails they are printed, and every later transition goes
/// straight to plain output.
#[derive(Debug, Default)]
pub struct Fallback {
    degraded: bool,
    unrendered: Vec<String>,
}

impl Fallback {
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn queue(&mut self, lines: impl IntoIterator<Item = String>) {
        self.unrendered.extend(lines);
    }

    /// Lines queued so far; everything counted here is already in the state.
    fn watermark(&self) -> usize {
        self.unrendered.len()
    }

    fn rendered(&mut self, upto: usize) {
        let upto = upto.min(self.unrendered.len());
        self.unrendered.drain(..upto);
    }

    fn degrade(&mut self) -> Vec<String> {
        self.degraded = true;
        std::mem::take(&mut self.unrendered)
    }
}

pub type SharedFallback = Arc<Mutex<Fallback>>;

pub fn lock_fallback(fallback: &SharedFallback) -> MutexGuard<'_, Fallback> {
    fallback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum RenderCommand {
    /// State changed; repaint once the debounce window passes quietly.
    Invalidate,
    /// Repaint now, dropping any pending debounce.
    RenderNow,
    /// Write the final frame, restore the terminal and exit.
    Finish(oneshot::Sender<()>),
}

/// Owns the render loop task and its timers.
///
/// Dropping the scheduler aborts the loop, so no write can happen after the
/// session is gone.
pub struct RenderScheduler {
    tx: mpsc::UnboundedSender<RenderCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenderScheduler {
    pub fn spawn(
        state: SharedState,
        sink: SharedSink,
        builder: FrameBuilder,
        timing: RenderTiming,
        fallback: SharedFallback,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let render_loop = RenderLoop {
            state,
            sink,
            builder,
            timing,
            fallback,
            last_frame: None,
            spinner_index: 0,
        };
        let handle = tokio::spawn(render_loop.run(rx));
        Self {
            tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn invalidate(&self) {
        let _ = self.tx.send(RenderCommand::Invalidate);
    }

    pub fn render_now(&self) {
        let _ = self.tx.send(RenderCommand::RenderNow);
    }

    /// Flushes the final frame and waits for the loop to exit. Idempotent.
    pub async fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(RenderCommand::Finish(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "render loop ended abnormally");
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

struct RenderLoop {
    state: SharedState,
    sink: SharedSink,
    builder: FrameBuilder,
    timing: RenderTiming,
    fallback: SharedFallback,
    last_frame: Option<RenderFrame>,
    spinner_index: usize,
}

impl RenderLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RenderCommand>) {
        let mut deadline: Option<Instant> = None;
        let mut spinner: Option<Interval> = None;

        loop {
            tokio::select! {
                biased;

                cmd = rx.recv() => match cmd {
                    Some(RenderCommand::Invalidate) => {
                        deadline = Some(Instant::now() + self.timing.debounce);
                    }
                    Some(RenderCommand::RenderNow) => {
                        deadline = None;
                        self.repaint();
                    }
                    Some(RenderCommand::Finish(ack)) => {
                        self.final_flush();
                        let _ = ack.send(());
                        break;
                    }
                    None => break,
                },

                _ = sleep_until(deadline), if deadline.is_some() => {
                    deadline = None;
                    self.repaint();
                }

                _ = tick(&mut spinner), if spinner.is_some() => {
                    self.spinner_index = self.spinner_index.wrapping_add(1);
                    self.repaint();
                }
            }

            self.sync_spinner(&mut spinner);
        }
    }

    /// Starts the spinner tick while anything runs and drops it otherwise.
    fn sync_spinner(&self, spinner: &mut Option<Interval>) {
        let running = lock_state(&self.state).tree.has_running();
        match (running, spinner.is_some()) {
            (true, false) => {
                let period = self.timing.spinner;
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                *spinner = Some(interval);
            }
            (false, true) => *spinner = None,
            _ => {}
        }
    }

    fn repaint(&mut self) {
        // Read before the snapshot so every counted line is in the frame.
        let watermark = {
            let fallback = lock_fallback(&self.fallback);
            if fallback.is_degraded() {
                return;
            }
            fallback.watermark()
        };
        let frame = {
            let state = lock_state(&self.state);
            if state.gate.suppressed() {
                return;
            }
            self.builder.build(&state.tree, self.spinner_index)
        };
        self.draw(frame, watermark);
    }

    /// Bypasses every gate except `silent`: the caller asked for the final state.
    fn final_flush(&mut self) {
        let watermark = lock_fallback(&self.fallback).watermark();
        let frame = {
            let state = lock_state(&self.state);
            (!state.gate.silent).then(|| self.builder.build(&state.tree, self.spinner_index))
        };
        if let Some(frame) = frame {
            if !lock_fallback(&self.fallback).is_degraded() {
                self.draw(frame, watermark);
            }
        }
        let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = sink.finish() {
            tracing::warn!(error = %e, "failed to restore terminal");
        }
    }

    fn draw(&mut self, frame: RenderFrame, watermark: usize) {
        let result = if self.last_frame.as_ref() == Some(&frame) {
            Ok(())
        } else {
            let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
            sink.draw(&frame)
        };
        match result {
            Ok(()) => {
                lock_fallback(&self.fallback).rendered(watermark);
                self.last_frame = Some(frame);
            }
            Err(e) => {
                let err = TaskError::RenderFailure(e);
                tracing::warn!(error = %err, "terminal write failed, falling back to plain output");
                self.degrade();
            }
        }
    }

    /// Prints what no frame showed, under the fallback lock so later
    /// transitions cannot overtake it.
    fn degrade(&mut self) {
        let mut fallback = lock_fallback(&self.fallback);
        let lines = fallback.degrade();
        let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
        for line in lines {
            if let Err(e) = sink.println(&line) {
                tracing::debug!(error = %e, "dropped output line");
                return;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick(spinner: &mut Option<Interval>) {
    match spinner {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::render::frame::Glyphs;
    use crate::render::sink::{shared, MemorySink};
    use crate::session::SessionState;
    use crate::task::{Task, TaskStatus};

    struct Harness {
        state: SharedState,
        sink: MemorySink,
        scheduler: RenderScheduler,
        fallback: SharedFallback,
    }

    fn harness(sink: MemorySink) -> Harness {
        let cfg = RenderConfig::default();
        let state = Arc::new(Mutex::new(SessionState::new(&cfg)));
        lock_state(&state).tree.add_tasks([
            Task::leaf("a", "A"),
            Task::leaf("b", "B"),
            Task::leaf("c", "C"),
            Task::leaf("d", "D"),
        ]);
        let fallback = SharedFallback::default();
        let scheduler = RenderScheduler::spawn(
            state.clone(),
            shared(Box::new(sink.clone())),
            FrameBuilder::new(Glyphs::ascii(), false, false),
            RenderTiming::from_config(&cfg),
            fallback.clone(),
        );
        Harness {
            state,
            sink,
            scheduler,
            fallback,
        }
    }

    fn set(h: &Harness, id: &str, status: TaskStatus) {
        lock_state(&h.state)
            .tree
            .update_status(id, status, None)
            .unwrap();
        h.scheduler.invalidate();
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_renders_once_with_latest_state() {
        let h = harness(MemorySink::new());

        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(10)).await;
        set(&h, "b", TaskStatus::Completed);
        tokio::time::sleep(ms(10)).await;
        set(&h, "c", TaskStatus::Skipped);
        tokio::time::sleep(ms(10)).await;
        assert!(h.sink.frames().is_empty());
        set(&h, "d", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;

        let frames = h.sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], "[x] A\n[x] B\n[-] C\n[x] D\n");
    }

    #[tokio::test(start_paused = true)]
    async fn identical_frames_are_written_once() {
        let h = harness(MemorySink::new());

        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(100)).await;
        h.scheduler.invalidate();
        tokio::time::sleep(ms(100)).await;
        h.scheduler.render_now();
        tokio::time::sleep(ms(10)).await;

        assert_eq!(h.sink.frames().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spinner_ticks_while_running_and_stops_after() {
        let h = harness(MemorySink::new());

        set(&h, "a", TaskStatus::Running);
        tokio::time::sleep(ms(350)).await;
        let while_running = h.sink.frames().len();
        assert!(while_running >= 3, "expected spinner repaints, got {while_running}");

        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(100)).await;
        let after_finish = h.sink.frames().len();
        tokio::time::sleep(ms(500)).await;
        assert_eq!(h.sink.frames().len(), after_finish);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_blocks_repaints_but_not_the_final_flush() {
        let h = harness(MemorySink::new());
        lock_state(&h.state).gate.failed = true;

        set(&h, "a", TaskStatus::Failed);
        tokio::time::sleep(ms(200)).await;
        assert!(h.sink.frames().is_empty());

        h.scheduler.stop().await;
        assert_eq!(h.sink.frames().len(), 1);
        assert!(h.sink.finished());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sessions_never_draw() {
        let h = harness(MemorySink::new());
        lock_state(&h.state).gate.silent = true;

        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;
        h.scheduler.stop().await;
        assert!(h.sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_degrades_instead_of_crashing() {
        let h = harness(MemorySink::failing());

        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;
        assert!(lock_fallback(&h.fallback).is_degraded());

        set(&h, "b", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;
        h.scheduler.stop().await;
        assert!(h.sink.finished());
    }

    #[tokio::test(start_paused = true)]
    async fn lines_not_yet_drawn_are_replayed_when_the_draw_fails() {
        let h = harness(MemorySink::failing());

        lock_fallback(&h.fallback).queue(["+ A".to_string()]);
        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;

        assert!(lock_fallback(&h.fallback).is_degraded());
        assert_eq!(h.sink.lines(), vec!["+ A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drawn_lines_leave_the_queue() {
        let h = harness(MemorySink::new());

        lock_fallback(&h.fallback).queue(["+ A".to_string()]);
        set(&h, "a", TaskStatus::Completed);
        tokio::time::sleep(ms(200)).await;

        assert_eq!(h.sink.frames().len(), 1);
        assert_eq!(lock_fallback(&h.fallback).watermark(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_written_after_stop() {
        let h = harness(MemorySink::new());
        h.scheduler.stop().await;
        let writes = h.sink.writes().len();

        set(&h, "a", TaskStatus::Running);
        tokio::time::sleep(ms(500)).await;
        assert_eq!(h.sink.writes().len(), writes);
    }
}
