//! In-memory, in-process command queue.
//!
//! Used for one-shot "instant" runs and tests: volatile, synchronous,
//! single-process. Commands still travel as [`CommandMemo`] records and are
//! reconstructed through the [`CommandRegistry`], so the instant path
//! exercises the same wire contract a durable backend would.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::command::Command;
use crate::error::QueueError;
use crate::memo::CommandMemo;
use crate::queue::CommandQueue;
use crate::registry::CommandRegistry;

#[derive(Default)]
struct QueueState {
    ready: VecDeque<CommandMemo>,
    in_flight: Vec<CommandMemo>,
}

/// In-memory [`CommandQueue`] implementation.
pub struct InstantCommandQueue {
    registry: Arc<CommandRegistry>,
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InstantCommandQueue {
    pub fn new(registry: Arc<CommandRegistry>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Number of commands currently claimable.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Number of commands pulled but neither confirmed nor requeued.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl CommandQueue for InstantCommandQueue {
    async fn next_command(&self, wait: bool) -> Result<Option<Box<dyn Command>>, QueueError> {
        loop {
            // Create the wakeup future before the emptiness check so a
            // publish racing with the check cannot be missed.
            let notified = self.notify.notified();

            {
                let mut state = self.state.lock().await;
                if let Some(memo) = state.ready.pop_front() {
                    let command = self.registry.restore(&memo)?;
                    state.in_flight.push(memo);
                    return Ok(Some(command));
                }
            }

            if !wait {
                return Ok(None);
            }
            notified.await;
        }
    }

    async fn confirm_command_handled(&self, command: &dyn Command) -> Result<(), QueueError> {
        let memo = command.memo();
        let mut state = self.state.lock().await;
        if let Some(index) = state.in_flight.iter().position(|m| *m == memo) {
            state.in_flight.remove(index);
        }
        // Confirming an unknown command is fine, the ack is idempotent.
        Ok(())
    }

    async fn requeue_command(&self, command: Box<dyn Command>) -> Result<(), QueueError> {
        let memo = command.memo();
        let mut state = self.state.lock().await;
        if let Some(index) = state.in_flight.iter().position(|m| *m == memo) {
            state.in_flight.remove(index);
        }
        state.ready.push_back(memo);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn publish_command(&self, command: Box<dyn Command>) -> Result<(), QueueError> {
        let memo = command.memo();
        memo.validate()?;

        let mut state = self.state.lock().await;
        state.ready.push_back(memo);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBody, CommandData};
    use crate::error::CommandError;
    use serde_json::json;
    use std::time::Duration;

    struct PingCommand {
        body: CommandBody,
    }

    impl PingCommand {
        const CLASS_ID: &'static str = "PingCommand";

        fn new(tag: &str) -> Self {
            let mut data = CommandData::new();
            data.insert("tag".to_owned(), json!(tag));
            Self {
                body: CommandBody::new(data),
            }
        }

        fn blank() -> Self {
            Self {
                body: CommandBody::empty(),
            }
        }
    }

    impl Command for PingCommand {
        fn concrete_type(&self) -> &'static str {
            Self::CLASS_ID
        }

        fn class_id(&self) -> &str {
            self.body.class_id_or(Self::CLASS_ID)
        }

        fn version(&self) -> u32 {
            self.body.version()
        }

        fn name(&self) -> &str {
            self.body.name_or(self.body.class_id_or(Self::CLASS_ID))
        }

        fn data(&self) -> &CommandData {
            self.body.data()
        }

        fn copy_with_data(&self, patch: CommandData) -> Box<dyn Command> {
            Box::new(PingCommand {
                body: self.body.merged(patch),
            })
        }

        fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError> {
            self.body.restore(Self::CLASS_ID, memo)
        }

        fn boxed_clone(&self) -> Box<dyn Command> {
            Box::new(PingCommand {
                body: self.body.clone(),
            })
        }
    }

    fn queue() -> InstantCommandQueue {
        let mut registry = CommandRegistry::new();
        registry
            .register(PingCommand::CLASS_ID, || Box::new(PingCommand::blank()))
            .unwrap();
        InstantCommandQueue::new(Arc::new(registry), "test_queue")
    }

    #[tokio::test]
    async fn non_blocking_pull_on_empty_queue_returns_none() {
        let queue = queue();
        let pulled = queue.next_command(false).await.unwrap();
        assert!(pulled.is_none());
    }

    #[tokio::test]
    async fn publish_then_pull_restores_the_command() {
        let queue = queue();
        queue
            .publish_command(Box::new(PingCommand::new("a")))
            .await
            .unwrap();

        let pulled = queue.next_command(false).await.unwrap().unwrap();
        assert_eq!(pulled.class_id(), "PingCommand");
        assert_eq!(pulled.data().get("tag"), Some(&json!("a")));
        assert_eq!(queue.in_flight_len().await, 1);
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let queue = queue();
        queue
            .publish_command(Box::new(PingCommand::new("a")))
            .await
            .unwrap();
        let pulled = queue.next_command(false).await.unwrap().unwrap();

        queue.confirm_command_handled(&*pulled).await.unwrap();
        queue.confirm_command_handled(&*pulled).await.unwrap();
        assert_eq!(queue.in_flight_len().await, 0);
        assert_eq!(queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn requeue_makes_the_command_claimable_again() {
        let queue = queue();
        queue
            .publish_command(Box::new(PingCommand::new("a")))
            .await
            .unwrap();
        let pulled = queue.next_command(false).await.unwrap().unwrap();
        assert_eq!(queue.ready_len().await, 0);

        queue.requeue_command(pulled).await.unwrap();
        assert_eq!(queue.ready_len().await, 1);
        assert_eq!(queue.in_flight_len().await, 0);

        let again = queue.next_command(false).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn blocking_pull_wakes_up_on_publish() {
        let queue = Arc::new(queue());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_command(true).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue
            .publish_command(Box::new(PingCommand::new("late")))
            .await
            .unwrap();

        let pulled = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("blocking pull should wake up")
            .unwrap()
            .unwrap();
        assert!(pulled.is_some());
    }

    #[tokio::test]
    async fn pulls_preserve_publish_order() {
        let queue = queue();
        for tag in ["first", "second"] {
            queue
                .publish_command(Box::new(PingCommand::new(tag)))
                .await
                .unwrap();
        }

        let first = queue.next_command(false).await.unwrap().unwrap();
        let second = queue.next_command(false).await.unwrap().unwrap();
        assert_eq!(first.data().get("tag"), Some(&json!("first")));
        assert_eq!(second.data().get("tag"), Some(&json!("second")));
    }
}
