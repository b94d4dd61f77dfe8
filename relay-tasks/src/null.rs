//! Fallback task for commands nothing else recognises.

use async_trait::async_trait;

use relay_queue::Command;

use crate::error::TaskError;
use crate::task::{derived_name, Task, TaskState};

/// Task that accepts any command, logs it and does nothing else.
///
/// The command handler falls back to a shared instance of this task when no
/// real task is registered for a command (outside production mode). It has
/// no steps, so it is always finished and never emits a continuation.
pub struct NullTask {
    name: String,
    state: TaskState,
}

impl NullTask {
    pub fn new() -> Self {
        Self {
            name: derived_name::<Self>(),
            state: TaskState::new(Vec::<String>::new()),
        }
    }
}

impl Default for NullTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for NullTask {
    fn restart_with(&mut self, command: Box<dyn Command>) -> Result<(), TaskError> {
        // Every command type is acceptable here, skip the recognition check.
        self.state.rebind(command);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        if let Some(command) = self.state.command() {
            tracing::debug!(
                command = command.name(),
                class_id = command.class_id(),
                "null task executed to handle command"
            );
        }
        Ok(())
    }

    fn next_command(&self) -> Result<Box<dyn Command>, TaskError> {
        self.state.continuation(&self.name, serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeCommand;
    use crate::sweep::SweepMarkerCommand;

    #[tokio::test]
    async fn accepts_commands_of_different_types() {
        let mut task = NullTask::new();

        task.restart_with(Box::new(ProbeCommand::new(None, None, None)))
            .unwrap();
        task.execute().await.unwrap();
        assert!(task.is_finished());

        task.restart_with(Box::new(SweepMarkerCommand::new("x")))
            .unwrap();
        task.execute().await.unwrap();
        assert!(task.is_finished());
    }

    #[test]
    fn never_emits_a_continuation() {
        let mut task = NullTask::new();
        task.restart_with(Box::new(ProbeCommand::new(None, None, None)))
            .unwrap();

        let err = task.next_command().err().unwrap();
        assert!(matches!(err, TaskError::AlreadyFinished(_)));
    }

    #[test]
    fn name_is_derived_from_the_type() {
        assert_eq!(NullTask::new().name(), "null");
    }
}
