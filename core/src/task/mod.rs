//! Task tree: stages group leaves, leaves carry status.

mod model;
mod tree;

pub use model::{aggregate_status, Task, TaskKind, TaskStatus};
pub use tree::{StatusChange, StatusTally, TaskTree};
