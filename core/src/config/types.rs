use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr. Off by default: the live frame owns the terminal.
    #[serde(default)]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taskdeck_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses the data directory.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: false,
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Quiet window before a repaint; restarted by every mutation.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_spinner_interval_ms")]
    pub spinner_interval_ms: u64,

    /// Show task messages on every row, not only on failures.
    #[serde(default)]
    pub verbose: bool,

    /// No progress output at all; the caller prints what it needs.
    #[serde(default)]
    pub silent: bool,

    /// One line per finished task instead of a live frame.
    #[serde(default)]
    pub simple_progress: bool,

    #[serde(default)]
    pub ascii: bool,

    #[serde(default = "default_color")]
    pub color: bool,

    /// Print error chains and enable the diagnostic line log.
    #[serde(default)]
    pub debug: bool,

    /// Captured output lines kept per task for the failure summary.
    #[serde(default = "default_output_tail_lines")]
    pub output_tail_lines: usize,
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_spinner_interval_ms() -> u64 {
    100
}

fn default_color() -> bool {
    true
}

fn default_output_tail_lines() -> usize {
    20
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            spinner_interval_ms: default_spinner_interval_ms(),
            verbose: false,
            silent: false,
            simple_progress: false,
            ascii: false,
            color: default_color(),
            debug: false,
            output_tail_lines: default_output_tail_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_line_channel_capacity")]
    pub line_channel_capacity: usize,

    /// Raw subprocess lines are appended here when `render.debug` is on.
    #[serde(default)]
    pub debug_log: Option<String>,

    /// After a clean exit, tasks that never reported are treated as cache hits.
    #[serde(default = "default_assume_cached_on_success")]
    pub assume_cached_on_success: bool,
}

fn default_line_channel_capacity() -> usize {
    1024
}

fn default_assume_cached_on_success() -> bool {
    true
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            line_channel_capacity: default_line_channel_capacity(),
            debug_log: None,
            assume_cached_on_success: default_assume_cached_on_success(),
        }
    }
}
