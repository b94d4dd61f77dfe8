//! Health-check command and task.
//!
//! A probe walks through two steps, completing one per execution, so a
//! single probe exercises the whole continuation protocol: publish, pull,
//! partial execution, republish, pull again, finish.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use relay_queue::{Command, CommandBody, CommandData, CommandError, CommandMemo};

use crate::error::TaskError;
use crate::task::{derived_name, Task, TaskState, JOB_UUID_KEY};

const NUMBER_KEY: &str = "number";
const LEVEL_KEY: &str = "level";
const FAIL_CODE_KEY: &str = "failCode";

const STEP_ANNOUNCE: &str = "announce";
const STEP_REPORT: &str = "report";

/// Command asking a worker to run one probe.
#[derive(Debug, Clone)]
pub struct ProbeCommand {
    body: CommandBody,
}

impl ProbeCommand {
    pub const CLASS_ID: &'static str = "ProbeCommand";

    pub fn new(number: Option<u64>, level: Option<&str>, job_uuid: Option<&str>) -> Self {
        let mut data = CommandData::new();
        if let Some(number) = number {
            data.insert(NUMBER_KEY.to_owned(), json!(number));
        }
        if let Some(level) = level {
            data.insert(LEVEL_KEY.to_owned(), json!(level));
        }
        if let Some(job_uuid) = job_uuid {
            data.insert(JOB_UUID_KEY.to_owned(), json!(job_uuid));
        }
        Self {
            body: CommandBody::new(data),
        }
    }

    /// Probe whose task fails with the given error code instead of doing
    /// its work. Used to verify the worker's retry-vs-fatal policy end to
    /// end.
    pub fn failing(code: i32) -> Self {
        let mut data = CommandData::new();
        data.insert(FAIL_CODE_KEY.to_owned(), json!(code));
        Self {
            body: CommandBody::new(data),
        }
    }

    pub(crate) fn blank() -> Self {
        Self {
            body: CommandBody::empty(),
        }
    }

    pub fn number(&self) -> Option<u64> {
        self.body.u64_item(NUMBER_KEY)
    }

    pub fn level(&self) -> &str {
        self.body.str_item(LEVEL_KEY).unwrap_or("info")
    }

    pub fn job_uuid(&self) -> Option<&str> {
        self.body.str_item(JOB_UUID_KEY)
    }

    pub fn fail_code(&self) -> Option<i32> {
        self.body
            .i64_item(FAIL_CODE_KEY)
            .and_then(|code| i32::try_from(code).ok())
    }
}

impl Command for ProbeCommand {
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
        Box::new(Self {
            body: self.body.merged(patch),
        })
    }

    fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError> {
        self.body.restore(Self::CLASS_ID, memo)
    }

    fn boxed_clone(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }
}

/// Task handling [`ProbeCommand`]s.
pub struct ProbeTask {
    name: String,
    state: TaskState,
}

impl ProbeTask {
    pub fn new() -> Self {
        Self {
            name: derived_name::<Self>(),
            state: TaskState::new([STEP_ANNOUNCE, STEP_REPORT]),
        }
    }

    fn bound_payload(&self) -> Result<ProbePayload, TaskError> {
        let command = self
            .state
            .command()
            .ok_or_else(|| TaskError::NoCommandBound(self.name.clone()))?;
        serde_json::from_value(serde_json::Value::Object(command.data().clone())).map_err(|e| {
            TaskError::Failed {
                code: 0,
                message: format!("invalid probe payload: {e}"),
            }
        })
    }
}

impl Default for ProbeTask {
    fn default() -> Self {
        Self::new()
    }
}

/// The slice of the command payload this task understands.
#[derive(Debug, Deserialize)]
struct ProbePayload {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default = "default_level")]
    level: String,
    #[serde(default, rename = "failCode")]
    fail_code: Option<i32>,
}

fn default_level() -> String {
    "info".to_owned()
}

#[async_trait]
impl Task for ProbeTask {
    fn restart_with(&mut self, command: Box<dyn Command>) -> Result<(), TaskError> {
        self.state.try_rebind(&self.name, command)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.state.assert_not_finished(&self.name)?;
        let probe = self.bound_payload()?;

        if let Some(code) = probe.fail_code {
            return Err(TaskError::Failed {
                code,
                message: format!("probe was asked to fail with code {code}"),
            });
        }

        if !self.state.is_done(STEP_ANNOUNCE) {
            let message = match probe.number {
                Some(number) => format!("hello from probe {number}"),
                None => "hello from probe".to_owned(),
            };
            log_at(&probe.level, self.state.job_uuid(), &message);
            self.state.mark_done(STEP_ANNOUNCE);
            return Ok(());
        }

        log_at(&probe.level, self.state.job_uuid(), "probe round trip complete");
        self.state.mark_done(STEP_REPORT);
        Ok(())
    }

    fn next_command(&self) -> Result<Box<dyn Command>, TaskError> {
        self.state.continuation(&self.name, json!({}))
    }
}

fn log_at(level: &str, job_uuid: Option<&str>, message: &str) {
    let job_uuid = job_uuid.unwrap_or("-");
    match level {
        "trace" => tracing::trace!(job_uuid, "{message}"),
        "debug" => tracing::debug!(job_uuid, "{message}"),
        "warn" | "warning" => tracing::warn!(job_uuid, "{message}"),
        "error" | "critical" => tracing::error!(job_uuid, "{message}"),
        _ => tracing::info!(job_uuid, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::STATUS_KEY;
    use serde_json::Value;

    #[tokio::test]
    async fn probe_finishes_across_two_executions() {
        let mut task = ProbeTask::new();
        task.restart_with(Box::new(ProbeCommand::new(Some(7), None, Some("uuid-7"))))
            .unwrap();

        task.execute().await.unwrap();
        assert!(!task.is_finished());

        let continuation = task.next_command().unwrap();
        let status = continuation
            .data()
            .get(STATUS_KEY)
            .and_then(Value::as_object)
            .expect("continuation must carry the status map");
        assert_eq!(status.get(STEP_ANNOUNCE), Some(&json!(true)));
        assert_eq!(status.get(STEP_REPORT), Some(&json!(false)));

        // A fresh instance picks the job up where the previous one left off.
        let mut resumed = ProbeTask::new();
        resumed.restart_with(continuation).unwrap();
        assert!(!resumed.is_finished());

        resumed.execute().await.unwrap();
        assert!(resumed.is_finished());
    }

    #[tokio::test]
    async fn continuation_carries_the_job_uuid_through() {
        let mut task = ProbeTask::new();
        task.restart_with(Box::new(ProbeCommand::new(None, None, Some("trace-me"))))
            .unwrap();
        task.execute().await.unwrap();

        let continuation = task.next_command().unwrap();
        assert_eq!(
            continuation.data().get(JOB_UUID_KEY),
            Some(&json!("trace-me"))
        );

        let mut resumed = ProbeTask::new();
        resumed.restart_with(continuation).unwrap();
        assert_eq!(resumed.state.job_uuid(), Some("trace-me"));
    }

    #[tokio::test]
    async fn finished_task_refuses_next_command() {
        let mut task = ProbeTask::new();
        task.restart_with(Box::new(ProbeCommand::new(None, None, None)))
            .unwrap();
        task.execute().await.unwrap();
        task.execute().await.unwrap();
        assert!(task.is_finished());

        let err = task.next_command().err().unwrap();
        assert!(matches!(err, TaskError::AlreadyFinished(_)));

        let err = task.execute().await.unwrap_err();
        assert!(matches!(err, TaskError::AlreadyFinished(_)));
    }

    #[tokio::test]
    async fn rebinding_with_a_foreign_command_type_is_refused() {
        let mut task = ProbeTask::new();
        task.restart_with(Box::new(ProbeCommand::new(None, None, None)))
            .unwrap();

        let foreign = crate::sweep::SweepMarkerCommand::new("sweep-1");
        let err = task.restart_with(Box::new(foreign)).unwrap_err();
        assert!(matches!(err, TaskError::UnrecognisedCommand { .. }));
    }

    #[tokio::test]
    async fn failing_probe_reports_its_code() {
        let mut task = ProbeTask::new();
        task.restart_with(Box::new(ProbeCommand::failing(5))).unwrap();

        let err = task.execute().await.unwrap_err();
        assert_eq!(err.code(), 5);
    }

    #[test]
    fn memo_round_trip_preserves_the_payload() {
        let command = ProbeCommand::new(Some(3), Some("debug"), Some("uuid-3"));
        let memo = command.memo();

        let mut restored = ProbeCommand::blank();
        restored.restore_from_memo(&memo).unwrap();
        assert_eq!(restored.memo(), memo);
        assert_eq!(restored.number(), Some(3));
        assert_eq!(restored.level(), "debug");
        assert_eq!(restored.job_uuid(), Some("uuid-3"));
    }
}
