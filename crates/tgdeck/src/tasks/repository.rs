//! Task database repository.
//!
//! Transition methods carry their status guard in the `WHERE` clause and
//! report whether a row changed, so concurrent drivers and stop requests
//! race safely: the loser simply affects zero rows.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{Task, TaskStatus};

const TASK_COLUMNS: &str = "id, chain_id, node_id, status, log, started_at, finished_at";

/// Repository for task persistence.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new pending task for a chain run.
    pub async fn create(&self, chain_id: i64) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (chain_id) VALUES (?) RETURNING {TASK_COLUMNS}",
        ))
        .bind(chain_id)
        .fetch_one(&self.pool)
        .await
        .context("creating task")?;

        Ok(task)
    }

    /// Get a task by id.
    pub async fn get(&self, id: i64) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching task")?;

        Ok(task)
    }

    /// List tasks that are still pending or running for a chain.
    pub async fn list_active_by_chain(&self, chain_id: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE chain_id = ? AND status IN ('pending', 'running') \
             ORDER BY started_at",
        ))
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await
        .context("listing active tasks")?;

        Ok(tasks)
    }

    /// Move a pending task to running, appending one log line.
    ///
    /// Returns the updated task, or `None` if the task was no longer pending
    /// (already stopped, or gone).
    pub async fn mark_running(&self, id: i64, node_id: &str, log_line: &str) -> Result<Option<Task>> {
        let Some(task) = self.get(id).await? else {
            return Ok(None);
        };
        if !task.status.can_transition(TaskStatus::Running) {
            return Ok(None);
        }

        let mut log = task.log.0.clone();
        log.push(log_line.to_string());
        let log_json = serde_json::to_string(&log).context("serializing task log")?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', node_id = ?, log = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(node_id)
        .bind(&log_json)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking task running")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Move a task into a terminal status, appending log lines and setting
    /// `finished_at` exactly once.
    ///
    /// Legal from pending or running only; otherwise a no-op returning `None`.
    pub async fn finish(
        &self,
        id: i64,
        status: TaskStatus,
        log_lines: &[&str],
    ) -> Result<Option<Task>> {
        anyhow::ensure!(status.is_terminal(), "finish requires a terminal status");

        let Some(task) = self.get(id).await? else {
            return Ok(None);
        };
        if !task.status.can_transition(status) {
            return Ok(None);
        }

        let mut log = task.log.0.clone();
        log.extend(log_lines.iter().map(|s| s.to_string()));
        let log_json = serde_json::to_string(&log).context("serializing task log")?;

        let result = sqlx::query(
            "UPDATE tasks SET status = ?, log = ?, finished_at = datetime('now') \
             WHERE id = ? AND status IN ('pending', 'running') AND finished_at IS NULL",
        )
        .bind(status.to_string())
        .bind(&log_json)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("finishing task")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }
}
