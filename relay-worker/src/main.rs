//! Relay worker CLI
//!
//! Entry point for worker processes and queue maintenance: runs and stops
//! supervised workers, publishes probe commands, and sweeps queues.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use relay_config::Config;
use relay_queue::CommandRegistry;
use relay_tasks::{register_builtin_commands, register_builtin_tasks, TaskRegistry};
use relay_worker::{maintenance, supervisor, PidFile, QueueFactory, Supervisor};

mod cli;
mod tracing_setup;

use cli::{Cli, Commands, ProbeArgs, RemoveAllArgs, RemoveTasksArgs, WorkerArgs};
use tracing_setup::{install_tracing_from_config, ReloadHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Resolve config path: CLI > environment variable
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("RELAY_CONFIG_PATH").ok().map(PathBuf::from));

    let config = load_config(&config_path)?;
    relay_config::validate_config(&config)?;

    let reload_handle = install_tracing_from_config(&config.logging);

    match cli.command {
        Commands::Worker(args) => worker_command(args, &config, &config_path, reload_handle).await,
        Commands::Probe(args) => probe_command(args, &config).await,
        Commands::RemoveTasks(args) => remove_tasks_command(args, &config).await,
        Commands::RemoveAll(args) => remove_all_command(args, &config).await,
    }
}

/// Load configuration from file or defaults.
fn load_config(path: &Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => relay_config::load_config(Some(p))?,
        None => relay_config::load_config::<&std::path::Path>(None)?,
    };
    Ok(config)
}

/// Build the factory with every built-in command and task registered.
fn build_factory(config: &Config) -> anyhow::Result<QueueFactory> {
    let mut commands = CommandRegistry::new();
    register_builtin_commands(&mut commands)?;
    let mut tasks = TaskRegistry::new();
    register_builtin_tasks(&mut tasks)?;
    Ok(QueueFactory::new(
        Arc::new(commands),
        Arc::new(tasks),
        config,
    ))
}

async fn worker_command(
    args: WorkerArgs,
    config: &Config,
    config_path: &Option<PathBuf>,
    reload_handle: Option<ReloadHandle>,
) -> anyhow::Result<()> {
    let pid_dir = PathBuf::from(&config.supervisor.pid_dir);
    let pid_prefix = &config.supervisor.pid_prefix;

    if let Some(stop) = args.stop {
        let removed = relay_worker::stop_workers(&pid_dir, pid_prefix, stop)?;
        println!("Requested stop of {removed} worker(s)");
        return Ok(());
    }

    if !args.run {
        // unreachable behind the argument group, kept as a guard
        anyhow::bail!("worker requires --run or --stop");
    }

    if let Some(level) = &args.level {
        match reload_handle {
            Some(reload) => match reload(tracing_subscriber::EnvFilter::new(level)) {
                Ok(()) => tracing::info!(level = %level, "minimal log level set"),
                Err(error) => tracing::warn!(error = %error, "could not change the log level"),
            },
            None => tracing::warn!("log level reloading is unavailable"),
        }
    }

    let workers = args.workers.unwrap_or(config.supervisor.workers).max(1);
    if workers > 1 && !args.spawned {
        spawn_additional_workers(workers - 1, config_path)?;
    }

    let interactive = !args.no_interaction && !args.spawned && std::io::stdin().is_terminal();

    let mut factory = build_factory(config)?;
    let worker = factory.queue_worker();

    let pid_file = PidFile::create(&pid_dir, pid_prefix)?;
    tracing::info!(
        pid_file = %pid_file.path().display(),
        queue = worker.queue_name(),
        "worker starting"
    );

    let (shutdown_tx, shutdown_rx) = supervisor::shutdown_channel();
    if !supervisor::spawn_signal_listener(shutdown_tx) {
        println!("Signal handling is unavailable; stop this worker via its pid file or the console.");
    }

    let mut supervised = Supervisor::new(
        worker,
        pid_file,
        shutdown_rx,
        Duration::from_millis(config.worker.idle_poll_ms),
    );

    if interactive {
        println!("To stop worker(s) in a gentle way write \"quit\", \"stop\" or \"end\" and hit enter.");
        println!("To exit immediately press CTRL+C, but this method should be avoided.");
        print!("{}", supervisor::PROMPT);
        let _ = std::io::stdout().flush();
        supervised = supervised.with_console(supervisor::spawn_console_listener());
    } else {
        println!("Executing tasks from queue. To stop press CTRL+C.");
    }

    match supervised.run().await {
        Ok(()) => {
            tracing::info!("worker finished with exit code 0");
            Ok(())
        }
        Err(error) => {
            eprintln!("Worker interrupted: [{}] {error}", error.code());
            std::process::exit(2);
        }
    }
}

/// Start detached worker processes repeating this invocation.
fn spawn_additional_workers(count: usize, config_path: &Option<PathBuf>) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    for _ in 0..count {
        let mut child = std::process::Command::new(&exe);
        if let Some(path) = config_path {
            child.arg("--config").arg(path);
        }
        child
            .args(["worker", "--run", "--workers", "1", "--spawned", "--no-interaction"])
            .stdin(Stdio::null());
        let spawned = child.spawn()?;
        tracing::info!(pid = spawned.id(), "spawned additional worker process");
    }
    Ok(())
}

async fn probe_command(args: ProbeArgs, config: &Config) -> anyhow::Result<()> {
    let mut factory = build_factory(config)?;
    factory.use_instant_implementations(args.instant);
    let queue = factory.command_queue();

    let job_uuid = uuid::Uuid::new_v4().to_string();
    maintenance::publish_probes(queue.as_ref(), args.tasks, Some(&job_uuid)).await?;
    println!(
        "Sent {} probe command(s) to queue {} (job {job_uuid})",
        args.tasks,
        queue.queue_name()
    );

    if args.instant {
        println!("The process has started. Do not interrupt it until it is finished!");
        let mut worker = factory.queue_worker();
        worker.run(None, true).await?;
        println!("Done");
    } else {
        println!("The process has started!");
    }
    Ok(())
}

async fn remove_tasks_command(args: RemoveTasksArgs, config: &Config) -> anyhow::Result<()> {
    if !args.run {
        eprintln!("To start the command, run it with option --run (-r)");
        std::process::exit(1);
    }

    let mut factory = build_factory(config)?;
    let queue = factory.command_queue();
    let resolver = factory.resolver();

    let removed =
        maintenance::remove_tasks(queue.as_ref(), resolver.as_ref(), &args.task_name).await?;
    println!("Number of removed tasks: {removed}");
    Ok(())
}

async fn remove_all_command(args: RemoveAllArgs, config: &Config) -> anyhow::Result<()> {
    if !args.run {
        eprintln!("To start the command, run it with option --run (-r)");
        std::process::exit(1);
    }

    let mut factory = build_factory(config)?;
    let queue = factory.command_queue();

    let removed = maintenance::remove_all(queue.as_ref(), Duration::from_secs(args.wait)).await?;
    println!("Number of removed tasks: {removed}");
    Ok(())
}
