//! ConvertResult - 完了したタスクの成果物

use std::sync::Arc;

use serde::Serialize;

use super::TaskId;

/// The completed outcome of a task.
///
/// The payload lives behind an `Arc`, so handing the same result to many
/// pollers never copies the video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertResult {
    task_id: TaskId,
    #[serde(skip)]
    payload: Arc<[u8]>,
    output_name: String,
}

impl ConvertResult {
    pub fn new(task_id: TaskId, payload: Vec<u8>, output_name: impl Into<String>) -> Self {
        Self {
            task_id,
            payload: Arc::from(payload),
            output_name: output_name.into(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True if both results share the same payload allocation.
    pub fn shares_payload(&self, other: &ConvertResult) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}
