use thiserror::Error;

use super::task::TaskError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Task(#[from] TaskError),
    #[error("runner failed: {0}")]
    Runner(#[from] RunnerError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("plan error: {0}")]
    Plan(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("wait failed: {0}")]
    Wait(std::io::Error),
    #[error("task error: {0}")]
    Task(#[from] TaskError),
}
