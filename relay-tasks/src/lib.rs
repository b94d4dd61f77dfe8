//! Task contract and built-in tasks for the relay task engine.
//!
//! This crate defines the [`Task`] side of the command/task pair: a task is
//! bound to one command at a time, tracks completion of named steps, and
//! emits a continuation command when it is not finished after an execution.
//! The [`CommandResolver`] port with its [`TaskRegistry`] implementation
//! maps incoming commands to the tasks that handle them.
//!
//! # Built-ins
//!
//! - [`ProbeCommand`] / [`ProbeTask`] - two-step health check exercising the
//!   continuation protocol
//! - [`SweepMarkerCommand`] - sentinel used by queue maintenance sweeps
//! - [`NullTask`] - fallback that accepts and logs anything
//!
//! # Usage
//!
//! ```rust,no_run
//! use relay_queue::CommandRegistry;
//! use relay_tasks::{register_builtin_commands, register_builtin_tasks, TaskRegistry};
//!
//! let mut commands = CommandRegistry::new();
//! let mut tasks = TaskRegistry::new();
//! register_builtin_commands(&mut commands).expect("fresh registry");
//! register_builtin_tasks(&mut tasks).expect("fresh registry");
//! ```

mod error;
mod null;
mod probe;
mod resolver;
mod sweep;
mod task;

pub use error::TaskError;
pub use null::NullTask;
pub use probe::{ProbeCommand, ProbeTask};
pub use resolver::{CommandResolver, TaskFactory, TaskRegistry};
pub use sweep::SweepMarkerCommand;
pub use task::{derived_name, Task, TaskState, JOB_UUID_KEY, STATUS_KEY};

use relay_queue::{CommandError, CommandRegistry, DEFAULT_COMMAND_VERSION};

/// Class id constants for the built-in commands.
pub mod class_ids {
    pub const PROBE: &str = "ProbeCommand";
    pub const SWEEP_MARKER: &str = "SweepMarkerCommand";
}

/// Register memo factories for every built-in command type.
pub fn register_builtin_commands(registry: &mut CommandRegistry) -> Result<(), CommandError> {
    registry.register(class_ids::PROBE, || Box::new(ProbeCommand::blank()))?;
    registry.register(class_ids::SWEEP_MARKER, || {
        Box::new(SweepMarkerCommand::blank())
    })?;
    Ok(())
}

/// Register task factories for every built-in command the engine can handle.
pub fn register_builtin_tasks(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    registry.register(class_ids::PROBE, DEFAULT_COMMAND_VERSION, || {
        Box::new(ProbeTask::new())
    })?;
    Ok(())
}
