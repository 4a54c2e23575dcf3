//! Externally driven runs: process output in, task transitions out.
//!
//! ```text
//! child stdout/stderr ─► io_pump ─► LineTap ─► ProcessMonitor::ingest_line
//!                                                 ├─ LogClassifier::classify
//!                                                 ├─ Dashboard::add_output   (per-task tail)
//!                                                 └─ Dashboard::update_task  (status patch)
//! ```

mod dashboard;
mod diagnostics;
mod io_pump;
mod monitor;

pub use dashboard::{Dashboard, TaskPatch};
pub use diagnostics::DiagnosticLog;
pub use io_pump::{pump_lines, LineStream, LineTap};
pub use monitor::{MonitorExit, ProcessMonitor, CACHED_MESSAGE};
