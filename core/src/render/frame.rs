use crossterm::style::{StyledContent, Stylize};

use crate::config::RenderConfig;
use crate::task::{Task, TaskKind, TaskStatus, TaskTree};

/// Immutable text snapshot of the whole tree, compared byte for byte
/// against the previous frame before any terminal write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFrame {
    text: String,
    lines: usize,
}

impl RenderFrame {
    pub fn new(text: String) -> Self {
        let lines = text.lines().count();
        Self { text, lines }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

#[derive(Debug, Clone)]
pub struct Glyphs {
    pub stage_pending: &'static str,
    pub stage_running: &'static str,
    pub done: &'static str,
    pub fail: &'static str,
    pub skip: &'static str,
    pub box_open: &'static str,
    pub box_checked: &'static str,
    pub box_failed: &'static str,
    pub box_skipped: &'static str,
    pub spinner: &'static [&'static str],
}

impl Glyphs {
    pub fn unicode() -> Self {
        Self {
            stage_pending: "○",
            stage_running: "◐",
            done: "✔",
            fail: "✖",
            skip: "↓",
            box_open: "☐",
            box_checked: "☑",
            box_failed: "☒",
            box_skipped: "☐",
            spinner: &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"],
        }
    }

    pub fn ascii() -> Self {
        Self {
            stage_pending: "o",
            stage_running: ">",
            done: "+",
            fail: "x",
            skip: "-",
            box_open: "[ ]",
            box_checked: "[x]",
            box_failed: "[!]",
            box_skipped: "[-]",
            spinner: &["|", "/", "-", "\\"],
        }
    }

    pub fn for_config(cfg: &RenderConfig) -> Self {
        if cfg.ascii {
            Self::ascii()
        } else {
            Self::unicode()
        }
    }

    /// Status marker used by stage rows and plain output.
    pub fn status(&self, status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending => self.stage_pending,
            TaskStatus::Running => self.stage_running,
            TaskStatus::Completed => self.done,
            TaskStatus::Failed => self.fail,
            TaskStatus::Skipped => self.skip,
        }
    }

    pub fn checkbox(&self, status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Pending | TaskStatus::Running => self.box_open,
            TaskStatus::Completed => self.box_checked,
            TaskStatus::Failed => self.box_failed,
            TaskStatus::Skipped => self.box_skipped,
        }
    }

    pub fn spinner_frame(&self, index: usize) -> &'static str {
        if self.spinner.is_empty() {
            return "";
        }
        self.spinner[index % self.spinner.len()]
    }
}

/// Turns a tree into a [`RenderFrame`].
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    glyphs: Glyphs,
    color: bool,
    verbose: bool,
}

impl FrameBuilder {
    pub fn new(glyphs: Glyphs, color: bool, verbose: bool) -> Self {
        Self {
            glyphs,
            color,
            verbose,
        }
    }

    pub fn from_config(cfg: &RenderConfig) -> Self {
        Self::new(Glyphs::for_config(cfg), cfg.color, cfg.verbose)
    }

    pub fn glyphs(&self) -> &Glyphs {
        &self.glyphs
    }

    pub fn build(&self, tree: &TaskTree, spinner_index: usize) -> RenderFrame {
        let mut out = String::new();
        for task in tree.tasks() {
            self.push_task(&mut out, task, 0, spinner_index);
        }
        RenderFrame::new(out)
    }

    fn push_task(&self, out: &mut String, task: &Task, depth: usize, spinner_index: usize) {
        let indent = "  ".repeat(depth);
        let status = task.status();
        match &task.kind {
            TaskKind::Stage { children } => {
                let row = format!("{} {}", self.glyphs.status(status), task.title);
                out.push_str(&indent);
                out.push_str(&self.paint(&row, status, true));
                out.push('\n');
                for child in children {
                    self.push_task(out, child, depth + 1, spinner_index);
                }
            }
            TaskKind::Leaf { message, .. } => {
                let row = format!("{} {}", self.glyphs.checkbox(status), task.title);
                out.push_str(&indent);
                out.push_str(&self.paint(&row, status, false));
                if status == TaskStatus::Running {
                    out.push(' ');
                    out.push_str(&self.paint(
                        self.glyphs.spinner_frame(spinner_index),
                        status,
                        false,
                    ));
                }
                if let Some(message) = message.as_deref().filter(|m| !m.is_empty()) {
                    if status == TaskStatus::Failed || self.verbose {
                        out.push_str(&self.dim(&format!(" ({message})")));
                    }
                }
                out.push('\n');
            }
        }
    }

    fn paint(&self, text: &str, status: TaskStatus, bold: bool) -> String {
        if !self.color {
            return text.to_string();
        }
        let styled: StyledContent<&str> = match status {
            TaskStatus::Pending => text.dark_grey(),
            TaskStatus::Running => text.cyan(),
            TaskStatus::Completed => text.green(),
            TaskStatus::Failed => text.red(),
            TaskStatus::Skipped => text.yellow(),
        };
        if bold {
            styled.bold().to_string()
        } else {
            styled.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dim().to_string()
        } else {
            text.to_string()
        }
    }
}
