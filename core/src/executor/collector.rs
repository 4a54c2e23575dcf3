use chrono::{DateTime, Local};

/// One buffered failure. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub task_id: String,
    pub task_title: String,
    pub error_message: String,
    pub timestamp: DateTime<Local>,
}

/// Append-only buffer of task failures, reported at the end of a
/// continue-on-error run.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    records: Vec<ErrorRecord>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(
        &mut self,
        task_id: impl Into<String>,
        task_title: impl Into<String>,
        error_message: impl Into<String>,
    ) {
        self.records.push(ErrorRecord {
            task_id: task_id.into(),
            task_title: task_title.into(),
            error_message: error_message.into(),
            timestamp: Local::now(),
        });
    }

    /// A copy of the buffer; later additions do not show up in it.
    pub fn get_error_buffer(&self) -> Vec<ErrorRecord> {
        self.records.clone()
    }

    pub fn clear_error_buffer(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_a_snapshot() {
        let mut collector = ErrorCollector::new();
        collector.add_error("install", "Install", "npm exited with 1");
        let snapshot = collector.get_error_buffer();
        collector.add_error("build", "Build", "tsc failed");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].task_title, "Install");
        assert_eq!(snapshot[0].task_id, "install");
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn records_keep_insertion_order_and_clear_empties() {
        let mut collector = ErrorCollector::new();
        collector.add_error("a", "a", "1");
        collector.add_error("b", "b", "2");
        let titles: Vec<_> = collector
            .get_error_buffer()
            .into_iter()
            .map(|r| r.task_title)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert!(collector.get_error_buffer()[0].timestamp <= collector.get_error_buffer()[1].timestamp);

        collector.clear_error_buffer();
        assert!(collector.is_empty());
    }
}
