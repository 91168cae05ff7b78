//! TaskManager - 変換タスクの投入・実行・結果取得の窓口
//!
//! - submit はキューが満杯なら即座に QueueFull を返す（待たない）
//! - 実行は WorkerGroup が担う（デフォルト 1 本）
//! - 呼び出し側は status / fetch_result をポーリングする

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::gc_loop::GcLoop;
use super::status::ManagerStats;
use super::worker_loop::{WorkerContext, WorkerGroup};
use crate::config::ManagerConfig;
use crate::domain::{
    ConvertResult, ConvertTask, InputRef, LifecycleError, SubmitError, TaskId, TaskStatus,
    WaitError,
};
use crate::ports::{Clock, Converter, IdGenerator};
use crate::queue::TaskQueue;
use crate::store::ResultStore;

/// Poll interval used by [`TaskManager::convert`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lower bound for caller-supplied poll intervals.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Reason recorded for tasks that were still queued or running at `stop()`.
pub const STOPPED_REASON: &str = "task manager stopped";

enum Lifecycle {
    Idle,
    Running { workers: WorkerGroup, gc: Option<GcLoop> },
    Stopped,
}

/// Owns the queue, the result store and the workers.
pub struct TaskManager {
    config: ManagerConfig,
    queue: Arc<TaskQueue>,
    store: Arc<ResultStore>,
    converter: Arc<dyn Converter>,
    ids: Arc<dyn IdGenerator>,
    lifecycle: Mutex<Lifecycle>,
}

impl TaskManager {
    pub(crate) fn new(
        config: ManagerConfig,
        converter: Arc<dyn Converter>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new(config.max_queue_size)),
            store: Arc::new(ResultStore::new(config.retention.clone(), clock)),
            converter,
            ids,
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawn the workers (and the gc loop when a ttl is set).
    ///
    /// Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running { .. } => return Ok(()),
            Lifecycle::Stopped => return Err(LifecycleError::Stopped),
            Lifecycle::Idle => {}
        }

        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            converter: Arc::clone(&self.converter),
            conversion_timeout: self.config.conversion_timeout,
        });
        let workers = WorkerGroup::spawn(self.config.workers, ctx);
        let gc = self
            .config
            .retention
            .ttl
            .map(|_| GcLoop::spawn(Arc::clone(&self.store), self.config.eviction_interval));

        info!(
            workers = self.config.workers,
            max_queue_size = self.config.max_queue_size,
            timeout = ?self.config.conversion_timeout,
            "task manager started"
        );
        *lifecycle = Lifecycle::Running { workers, gc };
        Ok(())
    }

    /// Stop accepting work and shut the workers down.
    ///
    /// In-flight conversions get `shutdown_grace` to finish; anything still
    /// queued or running afterwards is marked failed.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        if matches!(previous, Lifecycle::Stopped) {
            return;
        }

        let drained = self.queue.close().await;
        if !drained.is_empty() {
            warn!(count = drained.len(), "dropping queued tasks on stop");
        }

        if let Lifecycle::Running { workers, gc } = previous {
            if let Some(gc) = gc {
                gc.stop().await;
            }
            let aborted = workers.shutdown_and_join(self.config.shutdown_grace).await;
            if aborted > 0 {
                warn!(aborted, "aborted workers after shutdown grace");
            }
        }

        let abandoned = self.store.fail_unfinished(STOPPED_REASON).await;
        info!(abandoned = abandoned.len(), "task manager stopped");
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }

    /// Queue a conversion and return its id immediately.
    ///
    /// The manager takes ownership of `input` until the task finishes.
    pub async fn submit(
        &self,
        input: impl Into<InputRef>,
        output_name: impl Into<String>,
    ) -> Result<TaskId, SubmitError> {
        if self.queue.is_closed().await {
            return Err(SubmitError::NotRunning);
        }
        let task_id = self.ids.generate_task_id();
        let task = ConvertTask::new(task_id, input.into(), output_name);

        // 先に Pending を登録しないと、worker が先に拾ったとき mark_running が失敗する
        self.store.register(&task).await?;
        if let Err(e) = self.queue.enqueue(task).await {
            self.store.unregister(task_id).await;
            warn!(%task_id, error = %e, "submission rejected");
            return Err(e);
        }

        info!(%task_id, "task submitted");
        Ok(task_id)
    }

    /// Number of tasks waiting to be picked up.
    pub async fn queue_depth(&self) -> usize {
        self.queue.depth().await
    }

    /// The result of a succeeded task; `None` otherwise.
    pub async fn fetch_result(&self, task_id: TaskId) -> Option<ConvertResult> {
        self.store.get(task_id).await
    }

    /// Full status; `None` for unknown or evicted tasks.
    pub async fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.store.status(task_id).await
    }

    pub async fn stats(&self) -> ManagerStats {
        let depth = self.queue.depth().await;
        let counts = self.store.counts().await;
        ManagerStats::new(depth, self.queue.capacity(), counts, self.config.workers)
    }

    /// Poll until the task reaches a terminal state.
    ///
    /// `max_wait = None` waits as long as it takes. `poll_interval` is
    /// clamped to [`MIN_POLL_INTERVAL`].
    pub async fn wait_for(
        &self,
        task_id: TaskId,
        poll_interval: Duration,
        max_wait: Option<Duration>,
    ) -> Result<ConvertResult, WaitError> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.store.status(task_id).await {
                None => return Err(WaitError::Unknown(task_id)),
                Some(TaskStatus::Succeeded(result)) => return Ok(result),
                Some(TaskStatus::Failed { reason }) => {
                    return Err(WaitError::Failed { task_id, reason });
                }
                Some(TaskStatus::Pending | TaskStatus::Running) => {}
            }

            let waited = started.elapsed();
            if let Some(max_wait) = max_wait
                && waited >= max_wait
            {
                return Err(WaitError::TimedOut { task_id, waited });
            }
        }
    }

    /// Synchronous mode: submit and block the caller until the video is ready.
    pub async fn convert(
        &self,
        input: impl Into<InputRef>,
        output_name: impl Into<String>,
    ) -> Result<ConvertResult, WaitError> {
        let task_id = self.submit(input, output_name).await?;
        self.wait_for(task_id, DEFAULT_POLL_INTERVAL, None).await
    }
}
