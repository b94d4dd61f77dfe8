//! Wiring of queues and workers, with the instant-mode toggle.

use std::sync::Arc;

use relay_queue::{CommandQueue, CommandRegistry, InstantCommandQueue};
use relay_tasks::CommandResolver;

use crate::handler::{CommandHandler, CommandHandlerConfig};
use crate::worker::{QueueWorker, QueueWorkerConfig};

/// Produces the command queue and workers an invocation should use.
///
/// When instant implementations are toggled on, the factory hands out one
/// shared in-memory queue instead of the external backend, so a command can
/// be published and drained synchronously inside the current process. The
/// external backend is injected by the embedding application; none ships
/// in-repo.
pub struct QueueFactory {
    commands: Arc<CommandRegistry>,
    resolver: Arc<dyn CommandResolver>,
    queue_name: String,
    handler_config: CommandHandlerConfig,
    worker_config: QueueWorkerConfig,
    backend: Option<Arc<dyn CommandQueue>>,
    instant: bool,
    instant_queue: Option<Arc<InstantCommandQueue>>,
}

impl QueueFactory {
    pub fn new(
        commands: Arc<CommandRegistry>,
        resolver: Arc<dyn CommandResolver>,
        config: &relay_config::Config,
    ) -> Self {
        Self {
            commands,
            resolver,
            queue_name: config.queue.name.clone(),
            handler_config: CommandHandlerConfig {
                run_in_production: config.handler.run_in_production,
                reuse_tasks: config.handler.reuse_tasks,
            },
            worker_config: QueueWorkerConfig {
                exit_on_error: config.worker.exit_on_error,
                error_log_file: config.worker.error_log_file.clone().into(),
            },
            backend: None,
            instant: false,
            instant_queue: None,
        }
    }

    /// Attach the external queue backend.
    pub fn with_backend(mut self, backend: Arc<dyn CommandQueue>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Switch between the external backend and the in-memory instant
    /// implementations.
    pub fn use_instant_implementations(&mut self, enabled: bool) {
        self.instant = enabled;
    }

    /// The resolver workers and maintenance operations share.
    pub fn resolver(&self) -> Arc<dyn CommandResolver> {
        Arc::clone(&self.resolver)
    }

    /// The command queue selected by the toggle.
    pub fn command_queue(&mut self) -> Arc<dyn CommandQueue> {
        if !self.instant {
            if let Some(backend) = &self.backend {
                return Arc::clone(backend);
            }
            tracing::warn!("no external queue backend configured, using the in-memory instant queue");
        }

        let commands = Arc::clone(&self.commands);
        let name = self.queue_name.clone();
        let queue = self
            .instant_queue
            .get_or_insert_with(|| Arc::new(InstantCommandQueue::new(commands, name)));
        Arc::clone(queue) as Arc<dyn CommandQueue>
    }

    /// A worker wired to the selected queue.
    pub fn queue_worker(&mut self) -> QueueWorker {
        let queue = self.command_queue();
        let handler = CommandHandler::new(
            Arc::clone(&self.resolver),
            Arc::clone(&queue),
            self.handler_config.clone(),
        );
        QueueWorker::new(queue, handler, self.worker_config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_tasks::{register_builtin_commands, register_builtin_tasks, TaskRegistry};

    fn factory() -> QueueFactory {
        let mut commands = CommandRegistry::new();
        register_builtin_commands(&mut commands).unwrap();
        let mut tasks = TaskRegistry::new();
        register_builtin_tasks(&mut tasks).unwrap();
        QueueFactory::new(
            Arc::new(commands),
            Arc::new(tasks),
            &relay_config::Config::default(),
        )
    }

    #[tokio::test]
    async fn instant_queue_is_shared_between_calls() {
        let mut factory = factory();
        factory.use_instant_implementations(true);

        let queue = factory.command_queue();
        let worker_queue_name = factory.queue_worker().queue_name().to_owned();
        assert_eq!(queue.queue_name(), worker_queue_name);

        // both handles must reach the same underlying queue
        queue
            .publish_command(Box::new(relay_tasks::ProbeCommand::new(None, None, None)))
            .await
            .unwrap();
        let other = factory.command_queue();
        let pulled = other.next_command(false).await.unwrap();
        assert!(pulled.is_some());
    }

    #[tokio::test]
    async fn missing_backend_falls_back_to_instant() {
        let mut factory = factory();
        // toggle left off, but no backend is attached
        let queue = factory.command_queue();
        assert_eq!(queue.queue_name(), "relay_commands");
    }
}
