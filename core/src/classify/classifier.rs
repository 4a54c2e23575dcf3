use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::task::TaskTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    Start,
    Complete,
    /// Satisfied by a previous run. Completes the task like `Complete`.
    CacheHit,
    Error,
}

impl LogEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogEventKind::Start => "start",
            LogEventKind::Complete => "complete",
            LogEventKind::CacheHit => "cache_hit",
            LogEventKind::Error => "error",
        }
    }
}

/// A task-scoped transition read from one line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub task_id: String,
    pub kind: LogEventKind,
    pub raw_line: String,
}

/// Where a line's raw text is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Task(String),
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub event: Option<LogEvent>,
    pub target: OutputTarget,
    /// The line with colour codes removed.
    pub line: String,
}

static PREFIX_RE: OnceLock<Regex> = OnceLock::new();
static ANSI_RE: OnceLock<Regex> = OnceLock::new();
static START_RE: OnceLock<Regex> = OnceLock::new();
static COMPLETE_RE: OnceLock<Regex> = OnceLock::new();
static CACHED_RE: OnceLock<Regex> = OnceLock::new();
static LEADING_ERROR_RE: OnceLock<Regex> = OnceLock::new();
static ERROR_RE: OnceLock<Regex> = OnceLock::new();

fn prefix_re() -> &'static Regex {
    PREFIX_RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<name>[^\s:]+):(?P<phase>build|dev|test):\s?(?P<rest>.*)$")
            .expect("PREFIX_RE is valid")
    })
}

fn ansi_re() -> &'static Regex {
    ANSI_RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI_RE is valid")
    })
}

fn start_re() -> &'static Regex {
    START_RE.get_or_init(|| {
        Regex::new(r"(?i)\bcache miss, executing\b|\bcache bypass\b|\bstarted\b")
            .expect("START_RE is valid")
    })
}

fn complete_re() -> &'static Regex {
    COMPLETE_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(finished|completed|done)\b").expect("COMPLETE_RE is valid")
    })
}

fn cached_re() -> &'static Regex {
    CACHED_RE
        .get_or_init(|| Regex::new(r"(?i)\bcached\b|\bcache hit\b").expect("CACHED_RE is valid"))
}

fn leading_error_re() -> &'static Regex {
    LEADING_ERROR_RE
        .get_or_init(|| Regex::new(r"(?i)^\s*error\b").expect("LEADING_ERROR_RE is valid"))
}

fn error_re() -> &'static Regex {
    ERROR_RE.get_or_init(|| Regex::new(r"(?i)error|failed").expect("ERROR_RE is valid"))
}

pub fn strip_ansi(line: &str) -> String {
    ansi_re().replace_all(line, "").into_owned()
}

/// Verb of a `<name>:<phase>:` line, checked in order.
///
/// Best effort: a package whose name contains "error" reads as a failure.
fn match_verb(rest: &str) -> Option<LogEventKind> {
    // "ERROR: command finished with error" must not read as a completion.
    if leading_error_re().is_match(rest) {
        return Some(LogEventKind::Error);
    }
    if start_re().is_match(rest) {
        return Some(LogEventKind::Start);
    }
    if complete_re().is_match(rest) {
        return Some(LogEventKind::Complete);
    }
    if cached_re().is_match(rest) && !rest.to_ascii_lowercase().contains("executing") {
        return Some(LogEventKind::CacheHit);
    }
    if error_re().is_match(rest) {
        return Some(LogEventKind::Error);
    }
    None
}

/// Turns raw process lines into task events.
///
/// The only state is the name map, fixed at construction, and the task that
/// last started; unprefixed lines are attributed to that task.
#[derive(Debug, Clone, Default)]
pub struct LogClassifier {
    names: HashMap<String, String>,
    current: Option<String>,
}

impl LogClassifier {
    /// `pairs` maps the name printed in the prefix to a task id.
    pub fn new<I, N, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(n, t)| (n.into(), t.into()))
                .collect(),
            current: None,
        }
    }

    /// Every leaf is addressed by its own id.
    pub fn from_tree(tree: &TaskTree) -> Self {
        Self::new(tree.leaves().into_iter().map(|t| (t.id.clone(), t.id.clone())))
    }

    /// Task ids reachable through the name map.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    pub fn current_task(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    pub fn classify(&mut self, raw: &str) -> Classified {
        let line = strip_ansi(raw.trim_end_matches(['\r', '\n']));

        let Some(caps) = prefix_re().captures(&line) else {
            let target = match &self.current {
                Some(id) => OutputTarget::Task(id.clone()),
                None => OutputTarget::System,
            };
            return Classified {
                event: None,
                target,
                line,
            };
        };

        let name = caps.name("name").map_or("", |m| m.as_str());
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let kind = match_verb(rest);

        let Some(task_id) = self.names.get(name).cloned() else {
            tracing::debug!(name, "line for unmapped task name");
            return Classified {
                event: None,
                target: OutputTarget::System,
                line,
            };
        };

        if kind == Some(LogEventKind::Start) {
            self.current = Some(task_id.clone());
        }
        let event = kind.map(|kind| LogEvent {
            task_id: task_id.clone(),
            kind,
            raw_line: line.clone(),
        });
        Classified {
            event,
            target: OutputTarget::Task(task_id),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn classifier() -> LogClassifier {
        LogClassifier::new([("web", "web"), ("api", "api"), ("@acme/docs", "docs")])
    }

    fn kind(c: &mut LogClassifier, line: &str) -> Option<(String, LogEventKind)> {
        c.classify(line).event.map(|e| (e.task_id, e.kind))
    }

    #[test]
    fn recognises_each_verb() {
        let mut c = classifier();
        assert_eq!(
            kind(&mut c, "web:build: cache miss, executing abc123"),
            Some(("web".into(), LogEventKind::Start))
        );
        assert_eq!(
            kind(&mut c, "web:build: cached"),
            Some(("web".into(), LogEventKind::CacheHit))
        );
        assert_eq!(
            kind(&mut c, "api:build: Error: failed"),
            Some(("api".into(), LogEventKind::Error))
        );
        assert_eq!(
            kind(&mut c, "api:test: done in 2.1s"),
            Some(("api".into(), LogEventKind::Complete))
        );
        assert_eq!(
            kind(&mut c, "web:dev: cache hit, replaying logs 9f8e"),
            Some(("web".into(), LogEventKind::CacheHit))
        );
        assert_eq!(
            kind(&mut c, "web:build: cache bypass, force executing 1234"),
            Some(("web".into(), LogEventKind::Start))
        );
        assert_eq!(
            kind(&mut c, "@acme/docs:build: Started"),
            Some(("docs".into(), LogEventKind::Start))
        );
        assert_eq!(
            kind(&mut c, "web:build: ERROR: command finished with error: exit 1"),
            Some(("web".into(), LogEventKind::Error))
        );
    }

    #[test]
    fn unprefixed_lines_follow_the_current_task() {
        let mut c = classifier();
        let before = c.classify("warming up");
        assert_eq!(before.target, OutputTarget::System);

        c.classify("web:build: cache miss, executing abc123");
        let out = c.classify("  compiled 42 modules");
        assert_eq!(out.event, None);
        assert_eq!(out.target, OutputTarget::Task("web".into()));
        assert_eq!(out.line, "  compiled 42 modules");
    }

    #[test]
    fn prefixed_line_without_verb_goes_to_its_task() {
        let mut c = classifier();
        c.classify("web:build: cache miss, executing abc123");
        let out = c.classify("api:build: > tsc -p .");
        assert_eq!(out.event, None);
        assert_eq!(out.target, OutputTarget::Task("api".into()));
        assert_eq!(c.current_task(), Some("web"));
    }

    #[test]
    fn unmapped_names_are_system_output() {
        let mut c = classifier();
        let out = c.classify("cli:build: cache miss, executing ffff");
        assert_eq!(out.event, None);
        assert_eq!(out.target, OutputTarget::System);
        assert_eq!(c.current_task(), None);
    }

    #[test]
    fn unknown_phase_is_not_a_prefix() {
        let mut c = classifier();
        let out = c.classify("web:lint: started");
        assert_eq!(out.event, None);
        assert_eq!(out.target, OutputTarget::System);
    }

    #[test]
    fn colour_codes_are_stripped_before_matching() {
        let mut c = classifier();
        let out = c.classify("\u{1b}[36mweb:build: \u{1b}[0mcache miss, executing abc\r\n");
        assert_eq!(out.line, "web:build: cache miss, executing abc");
        assert_eq!(out.event.map(|e| e.kind), Some(LogEventKind::Start));
    }

    #[test]
    fn from_tree_maps_leaf_ids() {
        let mut tree = TaskTree::new();
        tree.add_tasks([
            Task::stage("apps", "Apps", [Task::leaf("web", "Web")]),
            Task::leaf("api", "API"),
        ]);
        let c = LogClassifier::from_tree(&tree);
        assert_eq!(c.resolve("web"), Some("web"));
        assert_eq!(c.resolve("api"), Some("api"));
        assert_eq!(c.resolve("apps"), None);
    }
}
