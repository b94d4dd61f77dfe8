//! Error types for the command model and queue port.

use thiserror::Error;

/// Errors raised while building, restoring or validating commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command memo is in invalid state: {0}")]
    InvalidMemo(String),

    #[error("cannot restore command of type `{expected}` from memo recorded for `{recorded}`")]
    TypeMismatch {
        expected: &'static str,
        recorded: String,
    },

    #[error("no command factory registered for concrete type `{0}`")]
    UnknownType(String),

    #[error("command factory for concrete type `{0}` is already registered")]
    AlreadyRegistered(String),
}

/// Errors surfaced by a queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend is unavailable")]
    Unavailable,

    #[error("queue backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}
