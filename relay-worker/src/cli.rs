use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use relay_worker::StopRequest;

/// Parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "relay-worker", version, about = "Run and control relay queue workers")]
pub struct Cli {
    /// Path to the configuration file (overrides the RELAY_CONFIG_PATH env var)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run or stop queue worker processes
    Worker(WorkerArgs),
    /// Check that queue and workers work by sending probe commands
    Probe(ProbeArgs),
    /// Remove queued tasks with a given name. Be sure no workers are running!
    RemoveTasks(RemoveTasksArgs),
    /// Remove ALL tasks from the queue
    RemoveAll(RemoveAllArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["run", "stop"])))]
pub struct WorkerArgs {
    /// Start worker process(es)
    #[arg(short, long)]
    pub run: bool,

    /// Stop all (or the given number of) running workers
    #[arg(
        short,
        long,
        value_name = "COUNT",
        num_args = 0..=1,
        default_missing_value = "all"
    )]
    pub stop: Option<StopRequest>,

    /// Number of worker processes to start
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Minimal level of messages to log
    #[arg(short, long, value_name = "LEVEL")]
    pub level: Option<String>,

    /// Disable interactive console control
    #[arg(long)]
    pub no_interaction: bool,

    /// Marks a process started by another worker invocation
    #[arg(long, hide = true)]
    pub spawned: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// How many probe commands to publish
    #[arg(short, long, default_value_t = 5, value_name = "N")]
    pub tasks: usize,

    /// Use the in-memory queue and execute the probes in-process
    #[arg(short, long)]
    pub instant: bool,
}

#[derive(Args, Debug)]
pub struct RemoveTasksArgs {
    /// Name of the task to remove from the queue
    pub task_name: String,

    /// Start the command
    #[arg(short, long)]
    pub run: bool,
}

#[derive(Args, Debug)]
pub struct RemoveAllArgs {
    /// Start the command
    #[arg(short, long)]
    pub run: bool,

    /// Seconds to keep waiting for new tasks in the queue
    #[arg(short, long, default_value_t = 0, value_name = "SECONDS")]
    pub wait: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_requires_run_or_stop() {
        assert!(Cli::try_parse_from(["relay-worker", "worker"]).is_err());
    }

    #[test]
    fn worker_refuses_run_and_stop_together() {
        assert!(Cli::try_parse_from(["relay-worker", "worker", "--run", "--stop"]).is_err());
    }

    #[test]
    fn stop_defaults_to_all() {
        let cli = Cli::try_parse_from(["relay-worker", "worker", "--stop"]).unwrap();
        let Commands::Worker(args) = cli.command else {
            panic!("expected worker subcommand");
        };
        assert_eq!(args.stop, Some(StopRequest::All));
    }

    #[test]
    fn stop_accepts_a_count() {
        let cli = Cli::try_parse_from(["relay-worker", "worker", "--stop", "2"]).unwrap();
        let Commands::Worker(args) = cli.command else {
            panic!("expected worker subcommand");
        };
        assert_eq!(args.stop, Some(StopRequest::Count(2)));
    }

    #[test]
    fn config_flag_works_after_the_subcommand() {
        let cli =
            Cli::try_parse_from(["relay-worker", "probe", "--config", "relay.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
    }
}
