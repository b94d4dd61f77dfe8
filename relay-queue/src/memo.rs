//! Flat, storable snapshot of a command.

use serde::{Deserialize, Serialize};

use crate::command::CommandData;
use crate::error::CommandError;

/// Record carrying all data required to properly restore a command.
///
/// Memos are what actually crosses a transport or lands in storage; every
/// field must therefore stay serializable. `concrete_type` names the factory
/// in the [`CommandRegistry`](crate::CommandRegistry) that rebuilds the live
/// command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMemo {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub class_id: String,
    pub concrete_type: String,
    pub data: CommandData,
}

impl CommandMemo {
    /// Check the validity invariant.
    ///
    /// `name` and `concrete_type` must be non-empty and `version >= 1`;
    /// memos of version 2 and later must also carry a class id. Called on
    /// every reconstruction path.
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.name.is_empty() {
            return Err(CommandError::InvalidMemo("name is empty".into()));
        }
        if self.version < 1 {
            return Err(CommandError::InvalidMemo(format!(
                "version {} is below 1",
                self.version
            )));
        }
        if self.concrete_type.is_empty() {
            return Err(CommandError::InvalidMemo("concrete type is empty".into()));
        }
        if self.version > 1 && self.class_id.is_empty() {
            return Err(CommandError::InvalidMemo(format!(
                "class id is required from version 2 on (version is {})",
                self.version
            )));
        }
        Ok(())
    }

    /// Parse a memo from its serialized JSON form, enforcing validity.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CommandError> {
        let memo: CommandMemo = serde_json::from_value(value)
            .map_err(|e| CommandError::InvalidMemo(e.to_string()))?;
        memo.validate()?;
        Ok(memo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_memo() -> CommandMemo {
        CommandMemo {
            name: "ProbeCommand".to_owned(),
            version: 2,
            class_id: "ProbeCommand".to_owned(),
            concrete_type: "ProbeCommand".to_owned(),
            data: CommandData::new(),
        }
    }

    #[test]
    fn valid_memo_passes() {
        assert!(valid_memo().validate().is_ok());
    }

    #[test]
    fn empty_name_is_invalid() {
        let mut memo = valid_memo();
        memo.name = String::new();
        assert!(matches!(
            memo.validate(),
            Err(CommandError::InvalidMemo(_))
        ));
    }

    #[test]
    fn version_zero_is_invalid() {
        let mut memo = valid_memo();
        memo.version = 0;
        assert!(memo.validate().is_err());
    }

    #[test]
    fn missing_class_id_is_tolerated_only_for_version_one() {
        let mut memo = valid_memo();
        memo.class_id = String::new();
        assert!(memo.validate().is_err());

        memo.version = 1;
        assert!(memo.validate().is_ok());
    }

    #[test]
    fn empty_concrete_type_is_invalid() {
        let mut memo = valid_memo();
        memo.concrete_type = String::new();
        assert!(memo.validate().is_err());
    }

    #[test]
    fn from_json_enforces_validity() {
        let value = json!({
            "name": "",
            "version": 2,
            "class_id": "ProbeCommand",
            "concrete_type": "ProbeCommand",
            "data": {}
        });
        assert!(CommandMemo::from_json(value).is_err());
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let memo = valid_memo();
        let value = serde_json::to_value(&memo).unwrap();
        let back = CommandMemo::from_json(value).unwrap();
        assert_eq!(back, memo);
    }
}
