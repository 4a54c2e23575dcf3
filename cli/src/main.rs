use clap::Parser;
use taskdeck_cli::commands::{cli, run, watch};
use taskdeck_core::config::{self, AppConfig, LoggingConfig};
use taskdeck_core::error::{CliError, RunnerError, TaskError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(&args)?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;
    tracing::debug!(render = ?cfg.render, "configuration loaded");

    match args.command {
        cli::Commands::Run(run_args) => run::run(run_args, cfg).await,
        cli::Commands::Watch(watch_args) => watch::watch(watch_args, cfg).await,
    }
}

/// File, then environment (applied by the loader), then flags.
fn load_config(args: &cli::Args) -> Result<AppConfig, CliError> {
    let mut cfg = match &args.config {
        Some(path) => config::load_path(path),
        None => config::load_default(),
    }
    .map_err(|e| CliError::Config(e.to_string()))?;

    args.apply_to(&mut cfg.render);
    Ok(cfg)
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 1: a task failed
    // 11: config error
    // 12: plan error
    // 20: process start / IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Plan(_) => 12,
        CliError::Task(te) => match te {
            TaskError::TaskFailure { .. } => 1,
            _ => 50,
        },
        CliError::Runner(re) => match re {
            RunnerError::Spawn(_) => 20,
            RunnerError::StreamIo { .. } => 20,
            RunnerError::Wait(_) => 20,
            RunnerError::Task(te) if te.is_task_failure() => 1,
            RunnerError::Task(_) => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taskdeck"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("taskdeck.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    // Nothing to write to: stay quiet rather than fight the live frame.
    if !logging.console && maybe_writer.is_none() {
        return Ok(());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
