//! Resolution of commands to the tasks that handle them.

use std::collections::HashMap;

use relay_queue::Command;

use crate::error::TaskError;
use crate::task::Task;

/// Factory producing a fresh, unbound instance of one task type.
pub type TaskFactory = Box<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Port the command handler uses to find a task for a command.
pub trait CommandResolver: Send + Sync {
    /// Task capable of handling `command`, or `None` when no task is known
    /// for its class id and version.
    fn task_for_command(&self, command: &dyn Command) -> Option<Box<dyn Task>>;
}

/// [`CommandResolver`] backed by an explicit map keyed by class id and
/// version, populated at startup.
#[derive(Default)]
pub struct TaskRegistry {
    factories: HashMap<(String, u32), TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the task factory for one command class id and version.
    pub fn register<F>(
        &mut self,
        class_id: &str,
        version: u32,
        factory: F,
    ) -> Result<(), TaskError>
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        let key = (class_id.to_owned(), version);
        if self.factories.contains_key(&key) {
            return Err(TaskError::AlreadyRegistered {
                class_id: class_id.to_owned(),
                version,
            });
        }
        self.factories.insert(key, Box::new(factory));
        Ok(())
    }

    /// Registered `(class_id, version)` pairs.
    pub fn registered_keys(&self) -> Vec<(&str, u32)> {
        self.factories
            .keys()
            .map(|(class_id, version)| (class_id.as_str(), *version))
            .collect()
    }
}

impl CommandResolver for TaskRegistry {
    fn task_for_command(&self, command: &dyn Command) -> Option<Box<dyn Task>> {
        self.factories
            .get(&(command.class_id().to_owned(), command.version()))
            .map(|factory| factory())
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("registered_keys", &self.registered_keys())
            .finish()
    }
}
