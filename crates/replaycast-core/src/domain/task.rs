use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::TaskId;

/// Handle to the replay file a task converts.
///
/// The task manager owns the file from submission until the worker is done
/// with it; callers must not touch it in that window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef(PathBuf);

impl InputRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<&str> for InputRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for InputRef {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

/// A submitted unit of conversion work.
///
/// Created at submission, dequeued exactly once, dropped when the worker is
/// done with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertTask {
    task_id: TaskId,
    input: InputRef,
    output_name: String,
}

impl ConvertTask {
    pub fn new(task_id: TaskId, input: InputRef, output_name: impl Into<String>) -> Self {
        Self {
            task_id,
            input,
            output_name: output_name.into(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn input(&self) -> &InputRef {
        &self.input
    }

    /// Logical name of the eventual output (metadata only).
    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}
