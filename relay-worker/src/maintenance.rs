//! Queue maintenance operations: probes and sweeps.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use relay_queue::{CommandQueue, QueueError};
use relay_tasks::{CommandResolver, ProbeCommand, SweepMarkerCommand};

/// Log levels the probe publisher cycles through.
const PROBE_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Pause between empty pulls while `remove_all` waits out its idle window.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Publish `count` probe commands, cycling through the log levels.
///
/// Each probe runs as a two-step task, so a probe that comes back finished
/// proves the full publish → execute → continue → execute chain works.
pub async fn publish_probes(
    queue: &dyn CommandQueue,
    count: usize,
    job_uuid: Option<&str>,
) -> Result<(), QueueError> {
    for i in 0..count {
        let level = PROBE_LEVELS[i % PROBE_LEVELS.len()];
        let command = ProbeCommand::new(Some(i as u64 + 1), Some(level), job_uuid);
        tracing::debug!(number = i + 1, level, "publishing probe command");
        queue.publish_command(Box::new(command)).await?;
    }
    tracing::info!(count, queue = queue.queue_name(), "probe commands published");
    Ok(())
}

/// Remove every queued command whose task name matches `task_name`.
///
/// A sweep marker is published first; pulling commands until that marker
/// comes back guarantees everything queued ahead of it was inspected
/// exactly once, with non-matching commands requeued behind the marker.
/// Must only run while no workers are active. Returns the number of
/// removed commands.
pub async fn remove_tasks(
    queue: &dyn CommandQueue,
    resolver: &dyn CommandResolver,
    task_name: &str,
) -> Result<usize, QueueError> {
    let marker = SweepMarkerCommand::new(task_name);
    tracing::debug!(task_name, "publishing sweep marker");
    queue.publish_command(Box::new(marker)).await?;

    let mut removed = 0;
    while let Some(command) = queue.next_command(false).await? {
        if command.is(SweepMarkerCommand::CLASS_ID, 0) {
            if marker_uuid(&*command) == Some(task_name) {
                tracing::debug!(task_name, "own sweep marker reached, sweep complete");
                queue.confirm_command_handled(&*command).await?;
                break;
            }
            // marker of a concurrent sweep, leave it alone
            queue.requeue_command(command).await?;
            continue;
        }

        match resolver.task_for_command(&*command) {
            Some(task) if task.name() == task_name => {
                tracing::info!(command = command.name(), task = task_name, "removing task");
                queue.confirm_command_handled(&*command).await?;
                removed += 1;
            }
            _ => {
                queue.requeue_command(command).await?;
            }
        }
    }

    remove_orphaned_markers(queue, task_name).await?;

    tracing::info!(task_name, removed, "sweep finished");
    Ok(removed)
}

/// Confirm leftover markers of this sweep without disturbing anything else.
///
/// Everything pulled is held back until the queue is drained and only then
/// requeued, so the loop terminates without a second marker.
async fn remove_orphaned_markers(
    queue: &dyn CommandQueue,
    task_name: &str,
) -> Result<(), QueueError> {
    let mut keep = Vec::new();
    while let Some(command) = queue.next_command(false).await? {
        if command.is(SweepMarkerCommand::CLASS_ID, 0) && marker_uuid(&*command) == Some(task_name)
        {
            tracing::debug!(task_name, "removing orphaned sweep marker");
            queue.confirm_command_handled(&*command).await?;
        } else {
            keep.push(command);
        }
    }
    for command in keep {
        queue.requeue_command(command).await?;
    }
    Ok(())
}

fn marker_uuid(command: &dyn relay_queue::Command) -> Option<&str> {
    command.data().get("uuid").and_then(Value::as_str)
}

/// Remove every command from the queue.
///
/// Keeps draining for up to `wait` of idleness so stragglers published
/// while the drain runs are caught too. Returns the number of removed
/// commands.
pub async fn remove_all(queue: &dyn CommandQueue, wait: Duration) -> Result<usize, QueueError> {
    let mut removed = 0;
    let mut last_seen = Instant::now();

    loop {
        match queue.next_command(false).await? {
            Some(command) => {
                tracing::debug!(command = command.name(), "removing command");
                queue.confirm_command_handled(&*command).await?;
                removed += 1;
                last_seen = Instant::now();
            }
            None => {
                if last_seen.elapsed() >= wait {
                    break;
                }
                tokio::time::sleep(DRAIN_POLL.min(wait)).await;
            }
        }
    }

    tracing::info!(removed, queue = queue.queue_name(), "queue drained");
    Ok(removed)
}
