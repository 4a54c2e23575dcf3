use crate::executor::ErrorRecord;
use crate::session::SessionState;

use super::frame::Glyphs;

/// Captured output lines shown under each failure.
const FAILURE_TAIL_LINES: usize = 5;

/// Counts per status, then every buffered failure with its output tail.
pub fn summary_text(state: &SessionState, glyphs: &Glyphs) -> String {
    let tally = state.tree.tally();
    let mut out = format!(
        "Done: {} completed, {} failed, {} skipped, {} pending",
        tally.completed,
        tally.failed,
        tally.skipped,
        tally.pending + tally.running
    );

    let records = state.errors.get_error_buffer();
    if records.is_empty() {
        return out;
    }
    out.push_str(&format!("\n\nFailures ({}):", records.len()));
    for record in &records {
        push_failure(&mut out, state, glyphs, record);
    }
    out
}

fn push_failure(out: &mut String, state: &SessionState, glyphs: &Glyphs, record: &ErrorRecord) {
    out.push_str(&format!(
        "\n{} {}: {}",
        glyphs.fail, record.task_title, record.error_message
    ));

    let Some(tail) = state.outputs.task(&record.task_id) else {
        return;
    };
    for line in tail.tail(FAILURE_TAIL_LINES) {
        out.push_str("\n    | ");
        out.push_str(&line);
    }
}

/// Message printed when a run aborts; `debug` adds the full error chain.
pub fn error_banner(err: &anyhow::Error, debug: bool) -> String {
    if debug {
        format!("Error: {err:#}\n\n{err:?}")
    } else {
        format!("Error: {err:#}")
    }
}
