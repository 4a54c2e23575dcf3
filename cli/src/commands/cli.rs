use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use taskdeck_core::RenderConfig;

#[derive(Parser, Debug)]
#[command(name = "taskdeck", version, about = "Run task plans with a live terminal view")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show task messages on every row.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// No progress output; only the final summary or error.
    #[arg(long, global = true)]
    pub silent: bool,

    /// One line per finished task instead of a live view.
    #[arg(long, global = true)]
    pub simple: bool,

    #[arg(long, global = true)]
    pub ascii: bool,

    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print full error chains and write the diagnostic line log.
    #[arg(long, global = true)]
    pub debug: bool,
}

impl Args {
    /// Flags only ever switch behaviour on; configuration covers the rest.
    pub fn apply_to(&self, render: &mut RenderConfig) {
        render.verbose |= self.verbose;
        render.silent |= self.silent;
        render.simple_progress |= self.simple;
        render.ascii |= self.ascii;
        render.debug |= self.debug;
        if self.no_color {
            render.color = false;
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Plan file with `[[step]]` entries.
    pub plan: PathBuf,

    /// Keep going after a failed task and report every failure at the end.
    #[arg(long)]
    pub continue_on_error: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WatchArgs {
    /// Task to track, as `NAME` or `NAME=TITLE`. NAME is the prefix the
    /// process prints before each line.
    #[arg(long = "task", required = true, action = clap::ArgAction::Append)]
    pub tasks: Vec<String>,

    /// Append every raw line to this file (with --debug).
    #[arg(long)]
    pub debug_log: Option<String>,

    /// Command to run, after `--`.
    #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

impl WatchArgs {
    /// `(name, title)` pairs in the order given.
    pub fn task_specs(&self) -> Vec<(String, String)> {
        self.tasks
            .iter()
            .map(|spec| match spec.split_once('=') {
                Some((name, title)) if !title.trim().is_empty() => {
                    (name.trim().to_string(), title.trim().to_string())
                }
                Some((name, _)) => (name.trim().to_string(), name.trim().to_string()),
                None => (spec.trim().to_string(), spec.trim().to_string()),
            })
            .collect()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every task of a plan file in order.
    Run(RunArgs),
    /// Run a command and track tasks from its output.
    Watch(WatchArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_with_trailing_command() {
        let args = Args::parse_from([
            "taskdeck", "--ascii", "watch", "--task", "web=Web app", "--task", "api", "--",
            "turbo", "run", "build",
        ]);
        let Commands::Watch(watch) = &args.command else {
            panic!("expected watch");
        };
        assert_eq!(watch.command, vec!["turbo", "run", "build"]);
        assert_eq!(
            watch.task_specs(),
            vec![
                ("web".to_string(), "Web app".to_string()),
                ("api".to_string(), "api".to_string()),
            ]
        );
        assert!(args.ascii);
    }

    #[test]
    fn flags_override_render_config() {
        let args = Args::parse_from(["taskdeck", "run", "plan.toml", "--simple", "--no-color"]);
        let mut render = RenderConfig::default();
        args.apply_to(&mut render);
        assert!(render.simple_progress);
        assert!(!render.color);
        assert!(!render.verbose);
        let Commands::Run(run) = &args.command else {
            panic!("expected run");
        };
        assert_eq!(run.plan, PathBuf::from("plan.toml"));
        assert!(!run.continue_on_error);
    }
}
