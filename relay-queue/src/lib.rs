//! Command model and queue abstraction for the relay task engine.
//!
//! Producers build a [`Command`] and publish it through a [`CommandQueue`];
//! workers pull commands, hand them to a task, and either confirm them as
//! handled or requeue them. Commands travel between processes as flat
//! [`CommandMemo`] records and are reconstructed through an explicit
//! [`CommandRegistry`].
//!
//! # Architecture
//!
//! - [`Command`] - A serializable, versioned unit of requested work
//! - [`CommandMemo`] - The transport/persistence snapshot of a command
//! - [`CommandRegistry`] - Maps recorded concrete types back to live commands
//! - [`CommandQueue`] - The transport port workers and producers talk to
//! - [`InstantCommandQueue`] - In-memory, in-process queue for one-shot runs
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_queue::{Command, CommandBody, CommandData, CommandError, CommandMemo};
//!
//! struct GreetCommand {
//!     body: CommandBody,
//! }
//!
//! impl GreetCommand {
//!     pub const CLASS_ID: &'static str = "GreetCommand";
//! }
//!
//! impl Command for GreetCommand {
//!     fn concrete_type(&self) -> &'static str {
//!         "GreetCommand"
//!     }
//!
//!     fn class_id(&self) -> &str {
//!         self.body.class_id_or(Self::CLASS_ID)
//!     }
//!
//!     fn version(&self) -> u32 {
//!         self.body.version()
//!     }
//!
//!     fn name(&self) -> &str {
//!         self.body.name_or(self.body.class_id_or(Self::CLASS_ID))
//!     }
//!
//!     fn data(&self) -> &CommandData {
//!         self.body.data()
//!     }
//!
//!     fn copy_with_data(&self, patch: CommandData) -> Box<dyn Command> {
//!         Box::new(GreetCommand { body: self.body.merged(patch) })
//!     }
//!
//!     fn restore_from_memo(&mut self, memo: &CommandMemo) -> Result<(), CommandError> {
//!         self.body.restore(self.concrete_type(), memo)
//!     }
//!
//!     fn boxed_clone(&self) -> Box<dyn Command> {
//!         Box::new(GreetCommand { body: self.body.clone() })
//!     }
//! }
//! ```

mod command;
mod error;
mod instant;
mod memo;
mod queue;
mod registry;

pub use command::{Command, CommandBody, CommandData, DEFAULT_COMMAND_VERSION};
pub use error::{CommandError, QueueError};
pub use instant::InstantCommandQueue;
pub use memo::CommandMemo;
pub use queue::CommandQueue;
pub use registry::CommandRegistry;

// Re-export async_trait for convenience when implementing CommandQueue
pub use async_trait::async_trait;
