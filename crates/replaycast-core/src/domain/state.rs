//! State - タスクの状態
//!
//! State transitions:
//! - Pending -> Running -> Succeeded
//! - Pending -> Running -> Failed (conversion error / timeout)
//! - Pending -> Failed (manager stopped before the task was dequeued)
//!
//! Terminal states are write-once.

use serde::{Deserialize, Serialize};

use super::ConvertResult;

/// Status of a task as seen by a poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue.
    Pending,

    /// Being converted by a worker.
    Running,

    /// Conversion finished; the result is available.
    Succeeded(ConvertResult),

    /// Conversion failed or the task was dropped.
    Failed { reason: String },
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        match self {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Running => TaskState::Running,
            TaskStatus::Succeeded(_) => TaskState::Succeeded,
            TaskStatus::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn result(&self) -> Option<&ConvertResult> {
        match self {
            TaskStatus::Succeeded(result) => Some(result),
            _ => None,
        }
    }
}

/// Payload-free discriminant of [`TaskStatus`], used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}
