pub mod frame;
pub mod reporter;
pub mod scheduler;
pub mod sink;
pub mod summary;

pub use frame::{FrameBuilder, Glyphs, RenderFrame};
pub use reporter::{
    plain_line, select_reporter, InteractiveReporter, PlainReporter, Reporter, ReporterKind,
    SessionEnd,
};
pub use scheduler::{RenderScheduler, RenderTiming};
pub use sink::{FrameSink, MemorySink, PlainSink, SharedSink, SinkWrite, TerminalSink};
pub use summary::{error_banner, summary_text};
