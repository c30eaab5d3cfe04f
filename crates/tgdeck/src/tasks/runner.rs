//! Simulated chain run driver.
//!
//! Executes a task on a timer: after a short delay the task goes running with
//! its first log line, and after a longer one it completes with the rest of
//! the log. Every step is guarded by the repository's status checks, so a
//! stop request landing between steps simply wins and the driver goes quiet.

use log::debug;
use std::sync::Arc;
use std::time::Duration;

use super::TaskStatus;
use super::repository::TaskRepository;
use crate::ws::{Hub, ServerMessage};

/// Timing for the simulated run driver.
#[derive(Debug, Clone)]
pub struct RunDriverConfig {
    /// Delay before the task transitions to running.
    pub step_delay: Duration,
    /// Delay between running and completion.
    pub finish_delay: Duration,
}

impl Default for RunDriverConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(1),
            finish_delay: Duration::from_secs(4),
        }
    }
}

/// Drive one task run in the background, pushing updates to the owner.
pub fn spawn_run(
    tasks: TaskRepository,
    hub: Arc<Hub>,
    owner_id: i64,
    task_id: i64,
    config: RunDriverConfig,
) {
    tokio::spawn(async move {
        tokio::time::sleep(config.step_delay).await;
        let running = match tasks
            .mark_running(task_id, "message", "chain execution started")
            .await
        {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("task {} no longer pending, run driver exiting", task_id);
                return;
            }
            Err(e) => {
                log::error!("run driver failed to start task {}: {:?}", task_id, e);
                return;
            }
        };
        hub.send_to_user(owner_id, ServerMessage::TaskUpdate { task: running })
            .await;

        tokio::time::sleep(config.finish_delay).await;
        let completed = match tasks
            .finish(
                task_id,
                TaskStatus::Completed,
                &["entering node \"message\"", "greeting sent", "execution finished"],
            )
            .await
        {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("task {} already finished, run driver exiting", task_id);
                return;
            }
            Err(e) => {
                log::error!("run driver failed to finish task {}: {:?}", task_id, e);
                return;
            }
        };
        hub.send_to_user(owner_id, ServerMessage::TaskUpdate { task: completed })
            .await;
    });
}
