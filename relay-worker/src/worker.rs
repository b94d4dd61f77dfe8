//! The worker run loop and its retry-vs-fatal policy.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use relay_queue::CommandQueue;

use crate::error::WorkerError;
use crate::handler::CommandHandler;

/// Behavior switches for the worker loop.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Stop on the first error instead of requeueing the command and
    /// continuing. Errors with a positive code stop the worker regardless.
    pub exit_on_error: bool,
    /// File receiving one durable record per handling error.
    pub error_log_file: PathBuf,
}

/// Pulls commands off the queue one at a time and delegates them to the
/// command handler.
///
/// A handling failure is always logged twice: to the application log and as
/// a durable record in the error log file. The worker then either requeues
/// the command and keeps looping, or propagates the error so the process
/// stops, per the policy in [`QueueWorker::run_once`].
pub struct QueueWorker {
    queue: Arc<dyn CommandQueue>,
    handler: CommandHandler,
    exit_on_error: bool,
    error_log: ErrorLog,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn CommandQueue>,
        handler: CommandHandler,
        config: QueueWorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            exit_on_error: config.exit_on_error,
            error_log: ErrorLog::new(config.error_log_file),
        }
    }

    /// Handle incoming commands until a fatal error, or, with
    /// `break_if_queue_empty`, until one pull comes back empty.
    ///
    /// The drain mode is what instant in-process runs use: publish, then
    /// `run(None, true)` to execute everything synchronously.
    pub async fn run(
        &mut self,
        exit_on_error: Option<bool>,
        break_if_queue_empty: bool,
    ) -> Result<(), WorkerError> {
        loop {
            let handled = self.run_once(!break_if_queue_empty, exit_on_error).await?;
            if break_if_queue_empty && !handled {
                return Ok(());
            }
        }
    }

    /// Handle the next command and report whether one was handled.
    ///
    /// With `wait` set the pull blocks until a command is available; without
    /// it an empty queue yields `Ok(false)` immediately.
    ///
    /// On a handling failure the error is logged and durably recorded, then
    /// classified: fatal when the caller forced `exit_on_error`, when the
    /// caller left it unspecified and the worker's default says so, or when
    /// the error carries a positive code. Fatal errors propagate; anything
    /// else requeues the command and counts as handled.
    pub async fn run_once(
        &mut self,
        wait: bool,
        exit_on_error: Option<bool>,
    ) -> Result<bool, WorkerError> {
        let Some(command) = self.queue.next_command(wait).await? else {
            return Ok(false);
        };

        tracing::info!(command = command.name(), "handling command");
        match self.handler.handle(command.boxed_clone()).await {
            Ok(()) => {
                self.queue.confirm_command_handled(&*command).await?;
                Ok(true)
            }
            Err(error) => {
                let code = error.code();
                tracing::error!(code, error = %error, "command handling failed");
                self.error_log.append(code, &error)?;

                let fatal = exit_on_error.unwrap_or(self.exit_on_error) || code > 0;
                if fatal {
                    return Err(WorkerError::Handler(error));
                }

                tracing::info!(command = command.name(), "requeueing command after error");
                self.queue.requeue_command(command).await?;
                Ok(true)
            }
        }
    }

    /// Name of the queue this worker consumes.
    pub fn queue_name(&self) -> &str {
        self.queue.queue_name()
    }
}

/// Append-only sink for durable error records.
///
/// One record per error:
/// `<ISO-8601 timestamp> [<code>] <message>`, followed by a `Stacktrace:`
/// block listing the error's source chain. The whole record goes out in a
/// single append so concurrent worker processes never interleave lines.
/// Failing to write here is itself fatal: error visibility is a correctness
/// requirement, not best effort.
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn append(&self, code: i32, error: &dyn std::error::Error) -> Result<(), WorkerError> {
        let mut trace = String::new();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str(&format!("caused by: {cause}\n"));
            source = cause.source();
        }
        if trace.is_empty() {
            trace.push_str("(no further context)\n");
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let record = format!("{timestamp} [{code}] {error}\nStacktrace:\n{trace}\n");

        self.write_record(&record)
            .map_err(|source| WorkerError::ErrorLogSink {
                path: self.path.clone(),
                source,
            })
    }

    fn write_record(&self, record: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(record.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_tasks::TaskError;

    #[test]
    fn record_format_has_timestamp_code_and_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        let log = ErrorLog::new(path.clone());

        let error = TaskError::Failed {
            code: 7,
            message: "step exploded".to_owned(),
        };
        log.append(7, &error).unwrap();
        log.append(0, &TaskError::AlreadyFinished("probe".to_owned()))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut records = contents.split("\n\n");

        let first = records.next().unwrap();
        assert!(first.contains("[7] step exploded"));
        assert!(first.contains("Stacktrace:"));

        let second = records.next().unwrap();
        assert!(second.contains("[0] task probe is already finished"));
    }

    #[test]
    fn unwritable_sink_reports_the_path() {
        let log = ErrorLog::new(PathBuf::from("/nonexistent-dir/errors.log"));
        let error = TaskError::AlreadyFinished("probe".to_owned());

        let err = log.append(0, &error).unwrap_err();
        assert!(matches!(err, WorkerError::ErrorLogSink { .. }));
    }
}
