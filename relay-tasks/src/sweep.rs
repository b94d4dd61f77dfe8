//! Sentinel command used when sweeping tasks out of a queue.

use serde_json::json;

use relay_queue::{Command, CommandBody, CommandData, CommandError, CommandMemo};

const UUID_KEY: &str = "uuid";

/// Marker published before a queue sweep.
///
/// The sweep pulls commands until it meets its own marker again, which
/// guarantees it inspected everything that was queued ahead of it. No task
/// handles this command; workers must not be running during a sweep.
#[derive(Debug, Clone)]
pub struct SweepMarkerCommand {
    body: CommandBody,
}

impl SweepMarkerCommand {
    pub const CLASS_ID: &'static str = "SweepMarkerCommand";

    pub fn new(uuid: impl Into<String>) -> Self {
        let mut data = CommandData::new();
        data.insert(UUID_KEY.to_owned(), json!(uuid.into()));
        Self {
            body: CommandBody::new(data),
        }
    }

    pub(crate) fn blank() -> Self {
        Self {
            body: CommandBody::empty(),
        }
    }

    pub fn uuid(&self) -> Option<&str> {
        self.body.str_item(UUID_KEY)
    }

    /// Whether this marker carries exactly the given uuid.
    pub fn has_uuid(&self, uuid: &str) -> bool {
        self.uuid() == Some(uuid)
    }
}

impl Command for SweepMarkerCommand {
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
