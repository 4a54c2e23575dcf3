//! Best-effort classification of an external process's output.
//!
//! Lines of the form `<name>:<phase>: <text>` (phase one of `build`, `dev`,
//! `test`) are matched against a fixed vocabulary of verbs. The heuristic is
//! lossy; tools that can emit structured output should be read that way.

mod classifier;

pub use classifier::{strip_ansi, Classified, LogClassifier, LogEvent, LogEventKind, OutputTarget};
