//! Task execution against a render session.
//!
//! ```text
//! run_task(id, body)
//!   ↓ update_status(id, Running)      demotes any other running leaf
//!   ↓ body().await
//!   ├─ Ok  → Completed
//!   └─ Err → ErrorCollector::add_error → Failed
//!            ├─ continue_on_error → Ok(TaskOutcome::Failed)
//!            └─ abort            → session.finish(Failed) → Err(TaskFailure)
//! ```

mod collector;
mod runner;

pub use collector::{ErrorCollector, ErrorRecord};
pub use runner::{RunSummary, TaskOutcome, TaskRunner};
