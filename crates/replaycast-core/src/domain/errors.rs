//! Errors - エラー型と分類
//!
//! - SubmitError: 投入時に同期的に返す（QueueFull など）
//! - ConversionError: 外部変換の失敗。worker 内で閉じて Failed として記録する
//! - StoreError: ストアの整合性違反（二重完了など）
//! - LifecycleError: start/stop の誤用
//! - WaitError: 同期モードで完了を待つ側のエラー
//! - BuildError: ManagerBuilder::build() の設定検証エラー

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::TaskId;

/// Submission was rejected. No state is mutated.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("queue is full (capacity={capacity})")]
    QueueFull { capacity: usize },

    #[error("task manager is not accepting tasks")]
    NotRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of the external conversion procedure.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("expected exactly one output file in {dir}, found {found}")]
    UnexpectedOutputCount { dir: PathBuf, found: usize },

    #[error("conversion timed out after {0:?}")]
    TimedOut(Duration),

    #[error("converter panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub fn exit_status(program: impl Into<String>, code: Option<i32>, stderr: Option<String>) -> Self {
        Self::ExitStatus {
            program: program.into(),
            code,
            stderr,
        }
    }
}

/// Internal-consistency faults of the result store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task {0} is already registered")]
    DuplicateTask(TaskId),

    #[error("task {0} is not registered")]
    UnknownTask(TaskId),

    #[error("task {0} has already completed")]
    AlreadyCompleted(TaskId),
}

/// Misuse of the task manager lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("task manager has already been stopped")]
    Stopped,
}

/// Error while waiting for a task to finish.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("task {task_id} failed: {reason}")]
    Failed { task_id: TaskId, reason: String },

    #[error("task {0} is unknown (never submitted or already evicted)")]
    Unknown(TaskId),

    #[error("gave up waiting for task {task_id} after {waited:?}")]
    TimedOut { task_id: TaskId, waited: Duration },
}

/// Invalid task manager configuration, reported by `ManagerBuilder::build`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("no converter configured")]
    MissingConverter,

    #[error("max_queue_size must be at least 1")]
    ZeroQueueSize,

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("conversion_timeout must be non-zero (use None to disable it)")]
    ZeroTimeout,

    #[error("eviction_interval must be non-zero")]
    ZeroEvictionInterval,

    #[error("retention.max_entries must be at least 1 (use None to disable it)")]
    ZeroRetainedResults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_message_mentions_capacity() {
        let err = SubmitError::QueueFull { capacity: 1 };
        assert_eq!(err.to_string(), "queue is full (capacity=1)");
    }

    #[test]
    fn exit_status_message() {
        let err = ConversionError::exit_status("slp2mp4", Some(2), None);
        assert_eq!(err.to_string(), "slp2mp4 exited with status Some(2)");
    }
}
