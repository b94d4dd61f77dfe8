//! Supervised worker loop with cooperative shutdown.
//!
//! A supervised worker runs one non-blocking [`QueueWorker::run_once`] per
//! iteration and re-checks its three continue conditions before each one:
//! the shutdown flag is unset, its own pid file still exists, and no
//! interactive stop was requested. Shutdown is therefore never preemptive;
//! an in-flight task execution always completes.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::error::WorkerError;
use crate::pidfile::PidFile;
use crate::worker::QueueWorker;

/// Prompt shown in interactive mode.
pub const PROMPT: &str = "::-> ";

/// A request read from the interactive console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleRequest {
    Stop,
    Unrecognised(String),
}

/// Interpret one console line: `end`, `stop` and `quit` (any case) request
/// a graceful stop, empty input is ignored, anything else is unrecognised.
pub fn parse_console_line(line: &str) -> Option<ConsoleRequest> {
    let token = line.trim();
    if token.is_empty() {
        return None;
    }
    if token.eq_ignore_ascii_case("end")
        || token.eq_ignore_ascii_case("stop")
        || token.eq_ignore_ascii_case("quit")
    {
        Some(ConsoleRequest::Stop)
    } else {
        Some(ConsoleRequest::Unrecognised(token.to_owned()))
    }
}

/// Channel carrying the cooperative "keep running" flag.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Spawn the task that translates process signals into the shutdown flag.
///
/// On Unix this registers interrupt, terminate, quit and hang-up; whichever
/// arrives first flips the flag, and the loop observes it at its next
/// iteration boundary. Elsewhere only Ctrl-C is available. Returns `false`
/// when no handler could be registered; the loop then runs uninterruptible
/// and is stopped via its pid file or the console.
#[cfg(unix)]
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
        signal(SignalKind::hangup()),
    );
    match streams {
        (Ok(mut interrupt), Ok(mut terminate), Ok(mut quit), Ok(mut hangup)) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                    _ = quit.recv() => {}
                    _ = hangup.recv() => {}
                }
                tracing::info!("stop signal received");
                let _ = shutdown_tx.send(true);
            });
            true
        }
        _ => {
            tracing::warn!("could not register signal handlers");
            false
        }
    }
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> bool {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop signal received");
            let _ = shutdown_tx.send(true);
        }
    });
    true
}

/// Spawn the task reading stop requests from the console.
///
/// The reader blocks on stdin; the supervised loop drains the channel
/// non-blockingly once per iteration, so the loop itself never waits on
/// user input.
pub fn spawn_console_listener() -> mpsc::UnboundedReceiver<ConsoleRequest> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(request) = parse_console_line(&line) {
                        let stop = request == ConsoleRequest::Stop;
                        if tx.send(request).is_err() || stop {
                            break;
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    });
    rx
}

/// Runs one worker under the cooperative stop conditions.
pub struct Supervisor {
    worker: QueueWorker,
    pid_file: PidFile,
    shutdown: watch::Receiver<bool>,
    console: Option<mpsc::UnboundedReceiver<ConsoleRequest>>,
    idle_wait: Duration,
}

impl Supervisor {
    pub fn new(
        worker: QueueWorker,
        pid_file: PidFile,
        shutdown: watch::Receiver<bool>,
        idle_wait: Duration,
    ) -> Self {
        Self {
            worker,
            pid_file,
            shutdown,
            console: None,
            idle_wait,
        }
    }

    /// Attach an interactive console channel.
    pub fn with_console(mut self, console: mpsc::UnboundedReceiver<ConsoleRequest>) -> Self {
        self.console = Some(console);
        self
    }

    /// Run until a stop condition or a fatal worker error.
    ///
    /// The pid file is deleted on every exit path. A stop via signal, pid
    /// file or console is a normal, successful shutdown; only a propagated
    /// worker error is returned as such.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        loop {
            if *self.shutdown.borrow() {
                tracing::info!("shutdown requested, stopping worker loop");
                break;
            }
            if !self.pid_file.exists() {
                tracing::info!(
                    pid_file = %self.pid_file.path().display(),
                    "pid file removed, stopping worker loop"
                );
                break;
            }
            if self.drain_console() {
                println!("Worker(s) stopped");
                break;
            }

            match self.worker.run_once(false, None).await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.idle_wait).await,
                Err(error) => {
                    self.pid_file.remove();
                    return Err(error);
                }
            }
        }

        self.pid_file.remove();
        Ok(())
    }

    /// Handle any pending console input; true means stop was requested.
    fn drain_console(&mut self) -> bool {
        let Some(console) = self.console.as_mut() else {
            return false;
        };
        loop {
            match console.try_recv() {
                Ok(ConsoleRequest::Stop) => return true,
                Ok(ConsoleRequest::Unrecognised(input)) => {
                    tracing::debug!(input, "unrecognised console command");
                    println!("Unrecognised command, use: end|stop|quit.");
                    print!("{PROMPT}");
                    let _ = std::io::stdout().flush();
                }
                Err(_) => return false,
            }
        }
    }
}
