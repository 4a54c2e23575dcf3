//! taskdeck core: hierarchical task orchestration with a live terminal view.
//!
//! ```text
//! command ──► TaskTree ◄── TaskRunner (run_task / skip_task / batch_update)
//!                │   ▲
//!                │   └──── Dashboard ◄── ProcessMonitor ◄── LogClassifier ◄── child stdout/stderr
//!                ▼
//!          Reporter (interactive: RenderScheduler + FrameSink | plain: one line per transition)
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod render;
pub mod session;
pub mod task;
pub mod util;

pub use classify::{LogClassifier, LogEvent, LogEventKind, OutputTarget};
pub use config::{AppConfig, ProcessConfig, RenderConfig};
pub use error::{CliError, RunnerError, TaskError};
pub use executor::{ErrorCollector, ErrorRecord, RunSummary, TaskOutcome, TaskRunner};
pub use ingest::{Dashboard, MonitorExit, ProcessMonitor, TaskPatch};
pub use render::{ReporterKind, SessionEnd};
pub use session::Session;
pub use task::{Task, TaskKind, TaskStatus, TaskTree};
