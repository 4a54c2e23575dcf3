use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crossterm::{cursor, queue, terminal};

use crate::classify::strip_ansi;

use super::frame::RenderFrame;

/// Where frames and lines end up.
pub trait FrameSink: Send {
    /// Replaces the live region with `frame`.
    fn draw(&mut self, frame: &RenderFrame) -> io::Result<()>;

    /// Writes a line below the live region; the region is left in place.
    fn println(&mut self, line: &str) -> io::Result<()>;

    /// Restores the terminal (cursor visibility) and flushes.
    fn finish(&mut self) -> io::Result<()>;
}

pub type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

pub fn shared(sink: Box<dyn FrameSink>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Redraws in place with cursor movement and line clearing.
///
/// Rewinds by screen rows, not frame lines: long lines wrap, and the cursor
/// cannot move above the top of the viewport.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    drawn_rows: usize,
    cursor_hidden: bool,
    viewport: Option<(u16, u16)>,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            drawn_rows: 0,
            cursor_hidden: false,
            viewport: None,
        }
    }

    /// Fixed `(columns, rows)` instead of querying the terminal.
    pub fn with_viewport(out: W, columns: u16, rows: u16) -> Self {
        Self {
            viewport: Some((columns, rows)),
            ..Self::new(out)
        }
    }

    fn viewport(&self) -> Option<(u16, u16)> {
        self.viewport.or_else(|| terminal::size().ok())
    }

    fn rewind(&mut self) -> io::Result<()> {
        let rows = match self.viewport() {
            Some((_, height)) => self.drawn_rows.min(usize::from(height)),
            None => self.drawn_rows,
        };
        if rows > 0 {
            let up = u16::try_from(rows).unwrap_or(u16::MAX);
            queue!(self.out, cursor::MoveToPreviousLine(up))?;
        }
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::FromCursorDown)
        )
    }
}

impl<W: Write + Send> FrameSink for TerminalSink<W> {
    fn draw(&mut self, frame: &RenderFrame) -> io::Result<()> {
        if !self.cursor_hidden {
            queue!(self.out, cursor::Hide)?;
            self.cursor_hidden = true;
        }
        self.rewind()?;
        for line in frame.lines() {
            self.out.write_all(line.as_bytes())?;
            self.out.write_all(b"\r\n")?;
        }
        self.out.flush()?;
        let width = self.viewport().map(|(w, _)| w);
        self.drawn_rows = frame.lines().map(|line| screen_rows(line, width)).sum();
        Ok(())
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\r\n")?;
        self.out.flush()?;
        // Whatever was printed now sits below the frame; never redraw over it.
        self.drawn_rows = 0;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.cursor_hidden {
            queue!(self.out, cursor::Show)?;
            self.cursor_hidden = false;
        }
        self.drawn_rows = 0;
        self.out.flush()
    }
}

/// Rows a line occupies once wrapped at `width` columns.
fn screen_rows(line: &str, width: Option<u16>) -> usize {
    let columns = strip_ansi(line).chars().count();
    match width {
        Some(w) if w > 0 => columns.div_ceil(usize::from(w)).max(1),
        _ => 1,
    }
}

/// Line output only. Frames are ignored: there is no live region.
pub struct PlainSink<W: Write + Send> {
    out: W,
}

impl PlainSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> PlainSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> FrameSink for PlainSink<W> {
    fn draw(&mut self, _frame: &RenderFrame) -> io::Result<()> {
        Ok(())
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkWrite {
    Frame(String),
    Line(String),
    Finish,
}

/// Records every write. Clones share the same record.
#[derive(Clone, Default)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<SinkWrite>>>,
    fail_draws: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `draw` always fails, as a closed terminal would.
    pub fn failing() -> Self {
        Self {
            writes: Arc::default(),
            fail_draws: true,
        }
    }

    pub fn writes(&self) -> Vec<SinkWrite> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn frames(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                SinkWrite::Frame(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                SinkWrite::Line(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.writes().contains(&SinkWrite::Finish)
    }

    fn record(&self, write: SinkWrite) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(write);
        }
    }
}

impl FrameSink for MemorySink {
    fn draw(&mut self, frame: &RenderFrame) -> io::Result<()> {
        if self.fail_draws {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal closed"));
        }
        self.record(SinkWrite::Frame(frame.as_str().to_string()));
        Ok(())
    }

    fn println(&mut self, line: &str) -> io::Result<()> {
        self.record(SinkWrite::Line(line.to_string()));
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.record(SinkWrite::Finish);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_sink_rewinds_over_the_previous_frame() {
        let mut sink = TerminalSink::with_viewport(Vec::new(), 80, 24);
        sink.draw(&RenderFrame::new("a\nb\n".into())).unwrap();
        let first_len = sink.out.len();
        sink.draw(&RenderFrame::new("a\nc\n".into())).unwrap();

        let second = String::from_utf8_lossy(&sink.out[first_len..]).to_string();
        // CSI 2 F: move to the start of the line two rows up.
        assert!(second.starts_with("\u{1b}[2F"));
        assert!(second.ends_with("a\r\nc\r\n"));
    }

    #[test]
    fn wrapped_rows_are_rewound_too() {
        let mut sink = TerminalSink::with_viewport(Vec::new(), 10, 24);
        sink.draw(&RenderFrame::new("\u{1b}[32m0123456789abcde\u{1b}[0m\nx\n".into()))
            .unwrap();
        let first_len = sink.out.len();
        sink.draw(&RenderFrame::new("y\n".into())).unwrap();

        let second = String::from_utf8_lossy(&sink.out[first_len..]).to_string();
        assert!(second.starts_with("\u{1b}[3F"), "{second:?}");
    }

    #[test]
    fn rewind_stops_at_the_top_of_the_viewport() {
        let mut sink = TerminalSink::with_viewport(Vec::new(), 80, 5);
        sink.draw(&RenderFrame::new("1\n2\n3\n4\n5\n6\n7\n8\n".into()))
            .unwrap();
        let first_len = sink.out.len();
        sink.draw(&RenderFrame::new("done\n".into())).unwrap();

        let second = String::from_utf8_lossy(&sink.out[first_len..]).to_string();
        assert!(second.starts_with("\u{1b}[5F"), "{second:?}");
    }

    #[test]
    fn screen_rows_ignore_colour_codes() {
        assert_eq!(screen_rows("", Some(10)), 1);
        assert_eq!(screen_rows("\u{1b}[31m0123456789\u{1b}[0m", Some(10)), 1);
        assert_eq!(screen_rows("01234567890", Some(10)), 2);
        assert_eq!(screen_rows("01234567890", None), 1);
    }

    #[test]
    fn terminal_sink_restores_cursor_on_finish() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.draw(&RenderFrame::new("x\n".into())).unwrap();
        sink.finish().unwrap();
        let out = String::from_utf8_lossy(&sink.out).to_string();
        assert!(out.contains("\u{1b}[?25l"));
        assert!(out.ends_with("\u{1b}[?25h"));
    }

    #[test]
    fn plain_sink_never_emits_control_sequences() {
        let mut sink = PlainSink::new(Vec::new());
        sink.draw(&RenderFrame::new("ignored\n".into())).unwrap();
        sink.println("✔ Install").unwrap();
        sink.finish().unwrap();
        let out = String::from_utf8(sink.out).unwrap();
        assert_eq!(out, "✔ Install\n");
    }

    #[test]
    fn memory_sink_clones_share_writes() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn FrameSink> = Box::new(sink.clone());
        boxed.println("hello").unwrap();
        assert_eq!(sink.lines(), vec!["hello"]);
    }
}
