//! Task data models.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Execution status of a task.
///
/// Transitions are monotonic: `pending -> running -> {completed, stopped}`.
/// `Completed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Stopped,
}

impl TaskStatus {
    /// Whether this status ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Stopped)
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            (TaskStatus::Pending, TaskStatus::Stopped) => true,
            (TaskStatus::Running, TaskStatus::Completed) => true,
            (TaskStatus::Running, TaskStatus::Stopped) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// One execution instance of a dialogue chain.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub chain_id: i64,
    pub node_id: String,
    pub status: TaskStatus,
    /// Append-only ordered log of execution lines.
    pub log: Json<Vec<String>>,
    pub started_at: String,
    /// Set exactly once, on entering a terminal status.
    pub finished_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Running));
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Stopped));
        assert!(TaskStatus::Running.can_transition(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition(TaskStatus::Stopped));
    }

    #[test]
    fn test_illegal_transitions() {
        // No way back to pending, no leaving a terminal state.
        assert!(!TaskStatus::Running.can_transition(TaskStatus::Pending));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::Running));
        assert!(!TaskStatus::Completed.can_transition(TaskStatus::Stopped));
        assert!(!TaskStatus::Stopped.can_transition(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
    }
}
