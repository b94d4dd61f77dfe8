//! Registry mapping recorded concrete types back to live commands.

use std::collections::HashMap;

use crate::command::Command;
use crate::error::CommandError;
use crate::memo::CommandMemo;

/// Factory producing an empty instance of one concrete command type.
pub type CommandFactory = Box<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Explicit map from a memo's `concrete_type` to a command factory.
///
/// Populated once at startup; restoring a memo whose type was never
/// registered is an error, there is no dynamic instantiation fallback.
#[derive(Default)]
pub struct CommandRegistry {
    factories: HashMap<String, CommandFactory>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for one concrete command type.
    pub fn register<F>(&mut self, concrete_type: &str, factory: F) -> Result<(), CommandError>
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        if self.factories.contains_key(concrete_type) {
            return Err(CommandError::AlreadyRegistered(concrete_type.to_owned()));
        }
        self.factories
            .insert(concrete_type.to_owned(), Box::new(factory));
        Ok(())
    }

    /// Concrete types with a registered factory.
    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Rebuild the live command a memo was taken from.
    ///
    /// Validates the memo, instantiates the recorded concrete type and
    /// feeds the memo back into it.
    pub fn restore(&self, memo: &CommandMemo) -> Result<Box<dyn Command>, CommandError> {
        memo.validate()?;

        let factory = self
            .factories
            .get(&memo.concrete_type)
            .ok_or_else(|| CommandError::UnknownType(memo.concrete_type.clone()))?;

        let mut command = factory();
        command.restore_from_memo(memo)?;
        Ok(command)
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("registered_types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBody, CommandData};
    use serde_json::json;

    struct EchoCommand {
        body: CommandBody,
    }

    impl EchoCommand {
        const CLASS_ID: &'static str = "EchoCommand";

        fn new(data: CommandData) -> Self {
            Self {
                body: CommandBody::new(data),
            }
        }
    }

    impl Command for EchoCommand {
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
            Box::new(EchoCommand {
                body: self.body.merged(patch),
            })
        }

        fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError> {
            self.body.restore(Self::CLASS_ID, memo)
        }

        fn boxed_clone(&self) -> Box<dyn Command> {
            Box::new(EchoCommand {
                body: self.body.clone(),
            })
        }
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register(EchoCommand::CLASS_ID, || {
                Box::new(EchoCommand::new(CommandData::new()))
            })
            .unwrap();
        registry
    }

    #[test]
    fn memo_round_trip_is_field_for_field_equal() {
        let mut data = CommandData::new();
        data.insert("text".to_owned(), json!("hello"));
        data.insert("count".to_owned(), json!(3));
        let command = EchoCommand::new(data);

        let memo = command.memo();
        let restored = registry().restore(&memo).unwrap();
        assert_eq!(restored.memo(), memo);
    }

    #[test]
    fn unknown_concrete_type_is_rejected() {
        let memo = CommandMemo {
            name: "MysteryCommand".to_owned(),
            version: 2,
            class_id: "MysteryCommand".to_owned(),
            concrete_type: "MysteryCommand".to_owned(),
            data: CommandData::new(),
        };

        let err = registry().restore(&memo).err().unwrap();
        assert!(matches!(err, CommandError::UnknownType(_)));
    }

    #[test]
    fn invalid_memo_never_reaches_the_factory() {
        let mut memo = EchoCommand::new(CommandData::new()).memo();
        memo.name = String::new();

        let err = registry().restore(&memo).err().unwrap();
        assert!(matches!(err, CommandError::InvalidMemo(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(EchoCommand::CLASS_ID, || {
                Box::new(EchoCommand::new(CommandData::new()))
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::AlreadyRegistered(_)));
    }
}
