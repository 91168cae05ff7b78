//! In-memory result store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{RetentionPolicy, TaskRecord};
use crate::domain::{ConvertResult, ConvertTask, StoreError, TaskId, TaskState, TaskStatus};
use crate::ports::Clock;

/// Per-state record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed
    }
}

struct StoreState {
    /// All known records (single source of truth).
    records: HashMap<TaskId, TaskRecord>,

    /// Finished task ids in completion order (eviction candidates).
    finished: VecDeque<TaskId>,
}

impl StoreState {
    fn record_mut(&mut self, task_id: TaskId) -> Result<&mut TaskRecord, StoreError> {
        let record = self
            .records
            .get_mut(&task_id)
            .ok_or(StoreError::UnknownTask(task_id))?;
        if record.is_terminal() {
            return Err(StoreError::AlreadyCompleted(task_id));
        }
        Ok(record)
    }

    fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while let Some(task_id) = self.finished.front().copied() {
            let expired = self
                .records
                .get(&task_id)
                .and_then(|r| r.finished_at)
                .is_none_or(|at| at <= cutoff);
            if !expired {
                break;
            }
            self.finished.pop_front();
            self.records.remove(&task_id);
            evicted += 1;
        }
        evicted
    }

    fn evict_over(&mut self, max_entries: usize) -> usize {
        let mut evicted = 0;
        while self.finished.len() > max_entries {
            if let Some(task_id) = self.finished.pop_front() {
                self.records.remove(&task_id);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Maps task ids to their status and, once done, their result.
///
/// Readers share an `RwLock`; every write swaps a whole status in under the
/// write guard, so a reader never sees a half-built result.
pub struct ResultStore {
    state: RwLock<StoreState>,
    retention: RetentionPolicy,
    clock: Arc<dyn Clock>,
}

impl ResultStore {
    pub fn new(retention: RetentionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                records: HashMap::new(),
                finished: VecDeque::new(),
            }),
            retention,
            clock,
        }
    }

    /// Start tracking a freshly submitted task as `Pending`.
    pub async fn register(&self, task: &ConvertTask) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        if state.records.contains_key(&task.task_id()) {
            return Err(StoreError::DuplicateTask(task.task_id()));
        }
        state
            .records
            .insert(task.task_id(), TaskRecord::pending(task, now));
        Ok(())
    }

    /// Forget a task that never made it into the queue.
    ///
    /// No worker can have seen such a task, but `fail_unfinished` may already
    /// have failed it, so the record is dropped whatever its state.
    pub(crate) async fn unregister(&self, task_id: TaskId) {
        let mut state = self.state.write().await;
        if state.records.remove(&task_id).is_some() {
            state.finished.retain(|id| *id != task_id);
        }
    }

    pub async fn mark_running(&self, task_id: TaskId) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.record_mut(task_id)?.start(now);
        Ok(())
    }

    /// Insert the result of a successful conversion.
    ///
    /// Write-once: a second completion is rejected and the first one kept.
    pub async fn put(&self, result: ConvertResult) -> Result<(), StoreError> {
        let task_id = result.task_id();
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.record_mut(task_id)?.succeed(result, now);
        self.finish(&mut state, task_id);
        Ok(())
    }

    /// Record a failed (or abandoned) task. Write-once like `put`.
    pub async fn fail(&self, task_id: TaskId, reason: impl Into<String>) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.record_mut(task_id)?.fail(reason.into(), now);
        self.finish(&mut state, task_id);
        Ok(())
    }

    /// Fail every task that has not finished yet, oldest first.
    pub async fn fail_unfinished(&self, reason: &str) -> Vec<TaskId> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut ids: Vec<TaskId> = state
            .records
            .values()
            .filter(|r| !r.is_terminal())
            .map(|r| r.task_id)
            .collect();
        ids.sort();

        for &task_id in &ids {
            if let Some(record) = state.records.get_mut(&task_id) {
                record.fail(reason.to_string(), now);
            }
            self.finish(&mut state, task_id);
        }
        ids
    }

    fn finish(&self, state: &mut StoreState, task_id: TaskId) {
        state.finished.push_back(task_id);
        if let Some(max_entries) = self.retention.max_entries {
            let evicted = state.evict_over(max_entries);
            if evicted > 0 {
                debug!(evicted, max_entries, "evicted finished tasks over capacity");
            }
        }
    }

    /// The result of a succeeded task. `None` covers unknown, evicted,
    /// still-pending and failed tasks alike.
    pub async fn get(&self, task_id: TaskId) -> Option<ConvertResult> {
        let state = self.state.read().await;
        state
            .records
            .get(&task_id)
            .and_then(|r| r.status.result().cloned())
    }

    /// Full status; `None` only for unknown or evicted tasks.
    pub async fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        let state = self.state.read().await;
        state.records.get(&task_id).map(|r| r.status.clone())
    }

    pub async fn record(&self, task_id: TaskId) -> Option<TaskRecord> {
        let state = self.state.read().await;
        state.records.get(&task_id).cloned()
    }

    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.read().await;
        let mut counts = StoreCounts::default();
        for record in state.records.values() {
            match record.state() {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drop finished records older than the retention ttl.
    pub async fn evict_expired(&self) -> usize {
        let Some(ttl) = self.retention.ttl else {
            return 0;
        };
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(error = %e, "retention ttl out of range, skipping eviction");
                return 0;
            }
        };

        let cutoff = self.clock.now() - ttl;
        let mut state = self.state.write().await;
        state.evict_older_than(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use ulid::Ulid;

    use super::*;
    use crate::domain::InputRef;
    use crate::ports::FixedClock;

    fn task(name: &str) -> ConvertTask {
        ConvertTask::new(
            TaskId::from_ulid(Ulid::new()),
            InputRef::new(format!("{name}.slp")),
            format!("{name}.mp4"),
        )
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn store(retention: RetentionPolicy, clock: Arc<FixedClock>) -> ResultStore {
        ResultStore::new(retention, clock)
    }

    #[tokio::test]
    async fn unknown_task_is_absent() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let id = TaskId::from_ulid(Ulid::new());
        assert!(store.get(id).await.is_none());
        assert!(store.status(id).await.is_none());
    }

    #[tokio::test]
    async fn pending_then_running_then_succeeded() {
        let clock = clock();
        let t0 = clock.now();
        let store = store(RetentionPolicy::unbounded(), Arc::clone(&clock));
        let t = task("game1");
        let id = t.task_id();

        store.register(&t).await.unwrap();
        assert_eq!(store.status(id).await, Some(TaskStatus::Pending));
        assert!(store.get(id).await.is_none());

        clock.advance(chrono::Duration::seconds(5));
        store.mark_running(id).await.unwrap();
        assert_eq!(store.status(id).await, Some(TaskStatus::Running));
        assert!(store.get(id).await.is_none());

        clock.advance(chrono::Duration::seconds(40));
        store
            .put(ConvertResult::new(id, vec![7; 16], "game1.mp4"))
            .await
            .unwrap();
        let got = store.get(id).await.unwrap();
        assert_eq!(got.payload(), &[7; 16]);
        assert_eq!(got.output_name(), "game1.mp4");

        let record = store.record(id).await.unwrap();
        assert_eq!(record.input, InputRef::new("game1.slp"));
        assert_eq!(record.created_at, t0);
        assert_eq!(record.started_at, Some(t0 + chrono::Duration::seconds(5)));
        assert_eq!(record.finished_at, Some(t0 + chrono::Duration::seconds(45)));
    }

    #[tokio::test]
    async fn reads_after_put_are_stable() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let t = task("a");
        let id = t.task_id();
        store.register(&t).await.unwrap();
        store.mark_running(id).await.unwrap();
        store.put(ConvertResult::new(id, vec![1, 2, 3], "a.mp4")).await.unwrap();

        let first = store.get(id).await.unwrap();
        for _ in 0..10 {
            let again = store.get(id).await.unwrap();
            assert_eq!(again, first);
            assert!(again.shares_payload(&first));
        }
    }

    #[tokio::test]
    async fn second_completion_is_rejected_and_first_kept() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let t = task("a");
        let id = t.task_id();
        store.register(&t).await.unwrap();
        store.mark_running(id).await.unwrap();
        store.put(ConvertResult::new(id, vec![1], "a.mp4")).await.unwrap();

        let err = store
            .put(ConvertResult::new(id, vec![2], "a.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyCompleted(id));

        let err = store.fail(id, "late failure").await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyCompleted(id));

        assert_eq!(store.get(id).await.unwrap().payload(), &[1]);
    }

    #[tokio::test]
    async fn result_without_task_is_rejected() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let id = TaskId::from_ulid(Ulid::new());
        let err = store
            .put(ConvertResult::new(id, vec![1], "x.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownTask(id));
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let t = task("a");
        store.register(&t).await.unwrap();
        let err = store.register(&t).await.unwrap_err();
        assert_eq!(err, StoreError::DuplicateTask(t.task_id()));
    }

    #[tokio::test]
    async fn failed_task_reports_reason_but_no_result() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let t = task("a");
        let id = t.task_id();
        store.register(&t).await.unwrap();
        store.mark_running(id).await.unwrap();
        store.fail(id, "slp2mp4 exited with status Some(1)").await.unwrap();

        assert!(store.get(id).await.is_none());
        assert_eq!(
            store.status(id).await,
            Some(TaskStatus::Failed {
                reason: "slp2mp4 exited with status Some(1)".to_string()
            })
        );
    }

    #[tokio::test]
    async fn ttl_eviction_only_touches_old_finished_records() {
        let clock = clock();
        let store = store(
            RetentionPolicy {
                ttl: Some(Duration::from_secs(60)),
                max_entries: None,
            },
            Arc::clone(&clock),
        );

        let old = task("old");
        let pending = task("pending");
        let fresh = task("fresh");
        for t in [&old, &pending, &fresh] {
            store.register(t).await.unwrap();
        }

        store.mark_running(old.task_id()).await.unwrap();
        store
            .put(ConvertResult::new(old.task_id(), vec![1], "old.mp4"))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(45));
        store.mark_running(fresh.task_id()).await.unwrap();
        store.fail(fresh.task_id(), "boom").await.unwrap();

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(store.evict_expired().await, 1);

        assert!(store.status(old.task_id()).await.is_none());
        assert_eq!(store.status(pending.task_id()).await, Some(TaskStatus::Pending));
        assert!(store.status(fresh.task_id()).await.is_some());
    }

    #[tokio::test]
    async fn capacity_eviction_drops_oldest_finished() {
        let store = store(
            RetentionPolicy {
                ttl: None,
                max_entries: Some(2),
            },
            clock(),
        );

        let tasks: Vec<ConvertTask> = (0..3).map(|i| task(&i.to_string())).collect();
        for t in &tasks {
            store.register(t).await.unwrap();
            store.mark_running(t.task_id()).await.unwrap();
            store
                .put(ConvertResult::new(t.task_id(), vec![0], t.output_name()))
                .await
                .unwrap();
        }

        assert!(store.get(tasks[0].task_id()).await.is_none());
        assert!(store.get(tasks[1].task_id()).await.is_some());
        assert!(store.get(tasks[2].task_id()).await.is_some());
        assert_eq!(store.counts().await.succeeded, 2);
    }

    #[tokio::test]
    async fn unregister_removes_pending_record() {
        let store = store(RetentionPolicy::unbounded(), clock());
        let t = task("a");
        store.register(&t).await.unwrap();
        store.unregister(t.task_id()).await;
        assert!(store.status(t.task_id()).await.is_none());
        assert_eq!(store.counts().await.total(), 0);
    }

    #[tokio::test]
    async fn unregister_after_stop_leaves_no_failed_record() {
        // submit が register した直後に stop が走ったケース
        let store = store(
            RetentionPolicy {
                ttl: None,
                max_entries: Some(1),
            },
            clock(),
        );
        let rejected = task("rejected");
        store.register(&rejected).await.unwrap();
        assert_eq!(
            store.fail_unfinished("task manager stopped").await,
            vec![rejected.task_id()]
        );

        store.unregister(rejected.task_id()).await;
        assert!(store.status(rejected.task_id()).await.is_none());
        assert_eq!(store.counts().await, StoreCounts::default());

        // finished からも消えているので、次の完了が押し出されることはない
        let next = task("next");
        store.register(&next).await.unwrap();
        store.mark_running(next.task_id()).await.unwrap();
        store
            .put(ConvertResult::new(next.task_id(), vec![1], "next.mp4"))
            .await
            .unwrap();
        assert!(store.get(next.task_id()).await.is_some());
    }
}
