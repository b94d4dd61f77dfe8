//! Error types for command handling and the worker loop.

use std::path::PathBuf;

use thiserror::Error;

use relay_queue::QueueError;
use relay_tasks::TaskError;

/// Errors raised while resolving and executing a task for a command.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("cannot determine which task should handle command {0}")]
    UnresolvedCommand(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl HandlerError {
    /// Numeric error code, forwarded from the failing task.
    ///
    /// A positive code is the task's way of declaring the failure fatal no
    /// matter what the worker's retry policy says.
    pub fn code(&self) -> i32 {
        match self {
            HandlerError::Task(error) => error.code(),
            _ => 0,
        }
    }
}

/// Errors that terminate a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Handler(HandlerError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("unable to write to error log file {path}: {source}")]
    ErrorLogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkerError {
    pub fn code(&self) -> i32 {
        match self {
            WorkerError::Handler(error) => error.code(),
            _ => 0,
        }
    }
}
