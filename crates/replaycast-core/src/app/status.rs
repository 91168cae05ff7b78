//! Status - manager-wide counters for observability.

use serde::Serialize;

use crate::store::StoreCounts;

/// Snapshot of the task manager.
///
/// `queue_depth` and the store counts are read one after the other, so they
/// may disagree by a task or two under load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub workers: usize,
}

impl ManagerStats {
    pub(crate) fn new(
        queue_depth: usize,
        queue_capacity: usize,
        counts: StoreCounts,
        workers: usize,
    ) -> Self {
        Self {
            queue_depth,
            queue_capacity,
            pending: counts.pending,
            running: counts.running,
            succeeded: counts.succeeded,
            failed: counts.failed,
            workers,
        }
    }
}
