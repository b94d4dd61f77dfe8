//! The task contract and the state machinery shared by all tasks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use relay_queue::Command;

use crate::error::TaskError;

/// Payload key under which a continuation command carries the step flags.
pub const STATUS_KEY: &str = "status";

/// Payload key carrying the job correlation id.
pub const JOB_UUID_KEY: &str = "jobUuid";

/// A stateful executor bound to one command at a time.
///
/// Tasks track the completion of named sub-steps. A task that is not
/// finished after an execution emits a continuation command so the job
/// resumes later, possibly in a different process. Task instances may be
/// reused across many commands of the same type via [`Task::restart_with`].
#[async_trait]
pub trait Task: Send + Sync {
    /// Re-bind this task to `command` so the instance can be reused.
    ///
    /// Fails with [`TaskError::UnrecognisedCommand`] when the command's
    /// concrete type differs from the previously bound one. On success the
    /// step flags are reset to the task's template and any saved status and
    /// job uuid found in the command payload are applied.
    fn restart_with(&mut self, command: Box<dyn Command>) -> Result<(), TaskError>;

    /// Stable lowercase identifier, derived once from the task's type.
    fn name(&self) -> &str;

    /// Whether every step is complete.
    fn is_finished(&self) -> bool;

    /// Perform the work for the current step(s), marking them complete.
    async fn execute(&mut self) -> Result<(), TaskError>;

    /// Continuation command for an unfinished task.
    ///
    /// Calling this on a finished task is a logic error.
    fn next_command(&self) -> Result<Box<dyn Command>, TaskError>;
}

/// Derive the conventional task name from a type: the last path segment,
/// minus a `Task` suffix, lowercased.
pub fn derived_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let simple = full.rsplit("::").next().unwrap_or(full);
    let trimmed = simple.strip_suffix("Task").unwrap_or(simple);
    if trimmed.is_empty() {
        simple.to_ascii_lowercase()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Bound command, step template and completion flags of one task instance.
///
/// Concrete tasks embed a `TaskState` and delegate the bookkeeping half of
/// the [`Task`] contract to it, keeping only their actual work in
/// `execute`. The step template is declared once per task type; every
/// rebind resets the flags to the template and then overlays whatever
/// status the incoming command saved, which is how a job resumes mid-flight
/// after a crash or restart.
pub struct TaskState {
    command: Option<Box<dyn Command>>,
    template: Vec<String>,
    status: BTreeMap<String, bool>,
    job_uuid: Option<String>,
}

impl TaskState {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let template: Vec<String> = steps.into_iter().map(Into::into).collect();
        let status = template.iter().map(|s| (s.clone(), false)).collect();
        Self {
            command: None,
            template,
            status,
            job_uuid: None,
        }
    }

    /// Whether `command` may be bound to this task: same concrete type as
    /// the previously bound command, or nothing bound yet.
    pub fn recognises(&self, command: &dyn Command) -> bool {
        match &self.command {
            None => true,
            Some(bound) => bound.concrete_type() == command.concrete_type(),
        }
    }

    /// Recognition-checked rebind, shared by every type-bound task.
    pub fn try_rebind(
        &mut self,
        task_name: &str,
        command: Box<dyn Command>,
    ) -> Result<(), TaskError> {
        if !self.recognises(&*command) {
            return Err(TaskError::UnrecognisedCommand {
                task: task_name.to_owned(),
                command: command.class_id().to_owned(),
            });
        }
        self.rebind(command);
        Ok(())
    }

    /// Bind `command`, resetting the flags to the template and restoring any
    /// saved status and job uuid from the command payload.
    pub fn rebind(&mut self, command: Box<dyn Command>) {
        self.status = self.template.iter().map(|s| (s.clone(), false)).collect();

        if let Some(saved) = command.data().get(STATUS_KEY).and_then(Value::as_object) {
            for (step, done) in saved {
                if let Some(done) = done.as_bool() {
                    self.status.insert(step.clone(), done);
                }
            }
        }

        self.job_uuid = command
            .data()
            .get(JOB_UUID_KEY)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        self.command = Some(command);
    }

    pub fn command(&self) -> Option<&dyn Command> {
        self.command.as_deref()
    }

    pub fn job_uuid(&self) -> Option<&str> {
        self.job_uuid.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.status.values().all(|done| *done)
    }

    pub fn is_done(&self, step: &str) -> bool {
        self.status.get(step).copied().unwrap_or(false)
    }

    /// Flag one step as complete.
    pub fn mark_done(&mut self, step: &str) {
        self.status.insert(step.to_owned(), true);
    }

    /// Flag every step as complete.
    pub fn finish_all(&mut self) {
        for done in self.status.values_mut() {
            *done = true;
        }
    }

    pub fn status(&self) -> &BTreeMap<String, bool> {
        &self.status
    }

    pub fn assert_not_finished(&self, task_name: &str) -> Result<(), TaskError> {
        if self.is_finished() {
            return Err(TaskError::AlreadyFinished(task_name.to_owned()));
        }
        Ok(())
    }

    /// Build the continuation command: the bound command copied with
    /// `patch`, null-valued entries dropped, plus the current status map.
    ///
    /// `patch` must be a JSON object; anything else from the task is an
    /// unexpected-value error.
    pub fn continuation(
        &self,
        task_name: &str,
        patch: Value,
    ) -> Result<Box<dyn Command>, TaskError> {
        self.assert_not_finished(task_name)?;

        let Value::Object(mut patch) = patch else {
            return Err(TaskError::InvalidContinuationData(task_name.to_owned()));
        };
        patch.retain(|_, value| !value.is_null());

        let status: serde_json::Map<String, Value> = self
            .status
            .iter()
            .map(|(step, done)| (step.clone(), Value::Bool(*done)))
            .collect();
        patch.insert(STATUS_KEY.to_owned(), Value::Object(status));

        let command = self
            .command
            .as_ref()
            .ok_or_else(|| TaskError::NoCommandBound(task_name.to_owned()))?;
        Ok(command.copy_with_data(patch))
    }
}

impl std::fmt::Debug for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskState")
            .field("template", &self.template)
            .field("status", &self.status)
            .field("job_uuid", &self.job_uuid)
            .field("bound", &self.command.is_some())
            .finish()
    }
}
