//! Queue worker processes and supervision for the relay task engine.
//!
//! This crate ties the command model and the task contract together into
//! running worker processes:
//!
//! - [`CommandHandler`](handler::CommandHandler) resolves a command to a
//!   task, executes it, and republishes the continuation of unfinished work
//! - [`QueueWorker`](worker::QueueWorker) is the pull → handle →
//!   (confirm | requeue) loop with the retry-vs-fatal error policy
//! - [`Supervisor`](supervisor::Supervisor) runs a worker under cooperative
//!   stop control: OS signals, pid-file removal and interactive console
//! - [`QueueFactory`](factory::QueueFactory) wires queues and workers, with
//!   the toggle selecting the in-memory instant implementations
//! - [`maintenance`] holds the probe publisher and the queue sweeps
//!
//! The `relay-worker` binary exposes all of this on the command line.

pub mod error;
pub mod factory;
pub mod handler;
pub mod maintenance;
pub mod pidfile;
pub mod supervisor;
pub mod worker;

pub use error::{HandlerError, WorkerError};
pub use factory::QueueFactory;
pub use handler::{CommandHandler, CommandHandlerConfig};
pub use pidfile::{stop_workers, PidFile, StopRequest};
pub use supervisor::Supervisor;
pub use worker::{ErrorLog, QueueWorker, QueueWorkerConfig};
