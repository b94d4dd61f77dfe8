//! Resolution and dispatch of commands to tasks.

use std::collections::HashMap;
use std::sync::Arc;

use relay_queue::{Command, CommandQueue};
use relay_tasks::{CommandResolver, NullTask, Task};

use crate::error::HandlerError;

/// Behavior switches for the command handler.
#[derive(Debug, Clone, Default)]
pub struct CommandHandlerConfig {
    /// Treat an unresolved command as a configuration defect and fail hard
    /// instead of falling back to the logging-only null task.
    pub run_in_production: bool,
    /// Cache one task instance per command class and version and reuse it
    /// across commands.
    pub reuse_tasks: bool,
}

/// Resolves a command to a task, executes it, and republishes the
/// continuation when the task is not finished.
///
/// The task cache is private to the owning worker process; workers never
/// share handlers.
pub struct CommandHandler {
    resolver: Arc<dyn CommandResolver>,
    queue: Arc<dyn CommandQueue>,
    cache: HashMap<String, Box<dyn Task>>,
    null_task: Option<NullTask>,
    run_in_production: bool,
    reuse_tasks: bool,
}

impl CommandHandler {
    pub fn new(
        resolver: Arc<dyn CommandResolver>,
        queue: Arc<dyn CommandQueue>,
        config: CommandHandlerConfig,
    ) -> Self {
        Self {
            resolver,
            queue,
            cache: HashMap::new(),
            null_task: None,
            run_in_production: config.run_in_production,
            reuse_tasks: config.reuse_tasks,
        }
    }

    /// Handle one command end to end.
    pub async fn handle(&mut self, command: Box<dyn Command>) -> Result<(), HandlerError> {
        if self.reuse_tasks {
            let cache_id = format!("{}_{}", command.class_id(), command.version());

            if !self.cache.contains_key(&cache_id) {
                if let Some(task) = self.resolver.task_for_command(&*command) {
                    tracing::info!(
                        command = command.name(),
                        task = task.name(),
                        "creating new task for command"
                    );
                    self.cache.insert(cache_id.clone(), task);
                }
            }

            if let Some(task) = self.cache.get_mut(&cache_id) {
                return run_task(self.queue.as_ref(), task.as_mut(), command).await;
            }
        } else if let Some(mut task) = self.resolver.task_for_command(&*command) {
            return run_task(self.queue.as_ref(), task.as_mut(), command).await;
        }

        self.handle_unresolved(command).await
    }

    /// Number of cached task instances.
    pub fn cached_tasks(&self) -> usize {
        self.cache.len()
    }

    async fn handle_unresolved(&mut self, command: Box<dyn Command>) -> Result<(), HandlerError> {
        if self.run_in_production {
            tracing::error!(
                command = command.name(),
                class_id = command.class_id(),
                "no task registered for command, refusing to continue"
            );
            return Err(HandlerError::UnresolvedCommand(command.name().to_owned()));
        }

        tracing::warn!(
            command = command.name(),
            class_id = command.class_id(),
            "null task returned to handle command, remember to fix it"
        );
        let task = self.null_task.get_or_insert_with(NullTask::new);
        run_task(self.queue.as_ref(), task, command).await
    }
}

async fn run_task(
    queue: &dyn CommandQueue,
    task: &mut dyn Task,
    command: Box<dyn Command>,
) -> Result<(), HandlerError> {
    task.restart_with(command)?;
    task.execute().await?;

    if !task.is_finished() {
        queue.publish_command(task.next_command()?).await?;
    }
    Ok(())
}
