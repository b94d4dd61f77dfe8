//! The transport port between producers and workers.

use async_trait::async_trait;

use crate::command::Command;
use crate::error::QueueError;

/// Queue of commands waiting to be handled.
///
/// Backends must provide an atomic "give me one unclaimed command" pull, a
/// requeue that makes a pulled command claimable again, and an idempotent
/// confirm that permanently removes a handled command. Delivery is
/// at-least-once: a command may be redelivered after a crash between pull
/// and confirm.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Next command ready to be handled.
    ///
    /// With `wait` set this blocks until a command is available and never
    /// returns `None`; without it the call returns immediately.
    async fn next_command(&self, wait: bool) -> Result<Option<Box<dyn Command>>, QueueError>;

    /// Confirm that this command has been handled. Idempotent.
    async fn confirm_command_handled(&self, command: &dyn Command) -> Result<(), QueueError>;

    /// Make a previously pulled command claimable again, for this or any
    /// other worker.
    async fn requeue_command(&self, command: Box<dyn Command>) -> Result<(), QueueError>;

    /// Send a new or continuation command to the queue.
    async fn publish_command(&self, command: Box<dyn Command>) -> Result<(), QueueError>;

    /// Name of the queue.
    fn queue_name(&self) -> &str;
}
