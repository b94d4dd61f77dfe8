//! The command contract and its shared plumbing.

use serde_json::Value;

use crate::error::CommandError;
use crate::memo::CommandMemo;

/// Opaque command payload, understood only by the task that handles it.
pub type CommandData = serde_json::Map<String, Value>;

/// Payload schema version newly built commands carry.
pub const DEFAULT_COMMAND_VERSION: u32 = 2;

/// A serializable, versioned unit of requested work.
///
/// The `class_id` selects which task handles the command; it defaults to the
/// concrete type's simple name but can be any constant identifier. Commands
/// are immutable by convention: [`Command::copy_with_data`] derives a patched
/// copy and never touches the receiver.
pub trait Command: Send + Sync {
    /// Registry key under which this concrete type can be reconstructed
    /// from a [`CommandMemo`].
    fn concrete_type(&self) -> &'static str;

    /// Stable identifier selecting the handling task.
    fn class_id(&self) -> &str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Human-readable label, defaults to the class id.
    fn name(&self) -> &str;

    /// Payload stored by this command.
    fn data(&self) -> &CommandData;

    /// Copy of this command with `patch` merged over its data (patch keys
    /// win). The receiver is left unchanged.
    fn copy_with_data(&self, patch: CommandData) -> Box<dyn Command>;

    /// Restore internal state from a memo recorded for this concrete type.
    fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError>;

    /// Owned copy behind a fresh box, so callers can retain the command
    /// across a dispatch that consumes it.
    fn boxed_clone(&self) -> Box<dyn Command>;

    /// Tell whether this command has exactly the given class id, and, when
    /// `version > 0`, exactly the given version too.
    fn is(&self, class_id: &str, version: u32) -> bool {
        if version > 0 {
            version == self.version() && class_id == self.class_id()
        } else {
            class_id == self.class_id()
        }
    }

    /// Flat snapshot carrying everything needed to restore this command.
    fn memo(&self) -> CommandMemo {
        CommandMemo {
            name: self.name().to_owned(),
            version: self.version(),
            class_id: self.class_id().to_owned(),
            concrete_type: self.concrete_type().to_owned(),
            data: self.data().clone(),
        }
    }
}

/// Shared state and plumbing embedded by every concrete command.
///
/// Concrete commands delegate the [`Command`] accessors to their body and
/// keep only construction and typed payload helpers for themselves.
#[derive(Debug, Clone)]
pub struct CommandBody {
    name: Option<String>,
    class_id: Option<String>,
    version: u32,
    data: CommandData,
}

impl CommandBody {
    pub fn new(data: CommandData) -> Self {
        Self {
            name: None,
            class_id: None,
            version: DEFAULT_COMMAND_VERSION,
            data,
        }
    }

    pub fn empty() -> Self {
        Self::new(CommandData::new())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn data(&self) -> &CommandData {
        &self.data
    }

    /// Name override from a restored memo, or the given default.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }

    /// Class id override from a restored memo, or the given default.
    pub fn class_id_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.class_id.as_deref().unwrap_or(default)
    }

    /// New body with `patch` merged over this body's data, patch keys win.
    pub fn merged(&self, patch: CommandData) -> CommandBody {
        let mut copy = self.clone();
        copy.data.extend(patch);
        copy
    }

    /// Adopt the state recorded in `memo`, refusing memos recorded for a
    /// different concrete type.
    pub fn restore(
        &mut self,
        own_type: &'static str,
        memo: &CommandMemo,
    ) -> Result<(), CommandError> {
        if memo.concrete_type != own_type {
            return Err(CommandError::TypeMismatch {
                expected: own_type,
                recorded: memo.concrete_type.clone(),
            });
        }

        self.name = Some(memo.name.clone());
        // Version 1 memos predate the class id field; keep the type default.
        self.class_id = if memo.class_id.is_empty() {
            None
        } else {
            Some(memo.class_id.clone())
        };
        self.version = memo.version;
        self.data = memo.data.clone();
        Ok(())
    }

    /// Raw payload entry.
    pub fn item(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Payload entry as a string slice.
    pub fn str_item(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Payload entry as an unsigned integer.
    pub fn u64_item(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    /// Payload entry as a signed integer.
    pub fn i64_item(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }
}

impl Default for CommandBody {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeCommand {
        body: CommandBody,
    }

    impl FakeCommand {
        const CLASS_ID: &'static str = "FakeCommand";

        fn new(data: CommandData) -> Self {
            Self {
                body: CommandBody::new(data),
            }
        }
    }

    impl Command for FakeCommand {
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
            Box::new(FakeCommand {
                body: self.body.merged(patch),
            })
        }

        fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError> {
            self.body.restore(Self::CLASS_ID, memo)
        }

        fn boxed_clone(&self) -> Box<dyn Command> {
            Box::new(FakeCommand {
                body: self.body.clone(),
            })
        }
    }

    fn data(value: Value) -> CommandData {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn defaults_derive_from_class_id() {
        let command = FakeCommand::new(CommandData::new());
        assert_eq!(command.class_id(), "FakeCommand");
        assert_eq!(command.name(), "FakeCommand");
        assert_eq!(command.version(), DEFAULT_COMMAND_VERSION);
    }

    #[test]
    fn is_matches_class_id_and_gates_on_version() {
        let command = FakeCommand::new(CommandData::new());
        assert!(command.is("FakeCommand", 0));
        assert!(command.is("FakeCommand", DEFAULT_COMMAND_VERSION));
        assert!(!command.is("FakeCommand", DEFAULT_COMMAND_VERSION + 1));
        assert!(!command.is("OtherCommand", 0));
    }

    #[test]
    fn copy_with_data_leaves_original_untouched() {
        let original = FakeCommand::new(data(json!({ "x": 0, "keep": "yes" })));

        let first = original.copy_with_data(data(json!({ "x": 1 })));
        let second = original.copy_with_data(data(json!({ "x": 2 })));

        assert_eq!(original.data().get("x"), Some(&json!(0)));
        assert_eq!(first.data().get("x"), Some(&json!(1)));
        assert_eq!(second.data().get("x"), Some(&json!(2)));
        assert_eq!(first.data().get("keep"), Some(&json!("yes")));
    }

    #[test]
    fn restore_rejects_foreign_concrete_type() {
        let mut command = FakeCommand::new(CommandData::new());
        let mut memo = command.memo();
        memo.concrete_type = "SomeOtherCommand".to_owned();

        let err = command.restore_from_memo(&memo).unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { .. }));
    }

    #[test]
    fn restore_keeps_type_default_class_id_for_v1_memos() {
        let mut memo = FakeCommand::new(CommandData::new()).memo();
        memo.version = 1;
        memo.class_id = String::new();

        let mut command = FakeCommand::new(CommandData::new());
        command.restore_from_memo(&memo).unwrap();
        assert_eq!(command.class_id(), "FakeCommand");
        assert_eq!(command.version(), 1);
    }
}
