//! Task record: metadata + status.

use chrono::{DateTime, Utc};

use crate::domain::{ConvertResult, ConvertTask, InputRef, TaskId, TaskState, TaskStatus};

/// Everything the store knows about one task.
///
/// - This is the single source of truth for a task's status.
/// - All state transitions happen here; the store only checks them.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub input: InputRef,
    pub output_name: String,
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(task: &ConvertTask, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.task_id(),
            input: task.input().clone(),
            output_name: task.output_name().to_string(),
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.status.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark as running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
    }

    /// Mark as succeeded.
    pub fn succeed(&mut self, result: ConvertResult, now: DateTime<Utc>) {
        self.status = TaskStatus::Succeeded(result);
        self.finished_at = Some(now);
    }

    /// Mark as failed.
    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed { reason };
        self.finished_at = Some(now);
    }
}
