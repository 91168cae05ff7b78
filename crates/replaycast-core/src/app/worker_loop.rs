//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. TaskQueue::dequeue() で先頭のタスクを取る（空なら待つ）
//! 2. ResultStore::mark_running()
//! 3. Converter::convert()（timeout 付き）
//! 4. 成功なら ResultStore::put()、失敗なら ResultStore::fail()
//!
//! 1 件の失敗でループは止まらない。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout_at;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::domain::{ConversionError, ConvertResult, ConvertTask};
use crate::ports::Converter;
use crate::queue::TaskQueue;
use crate::store::ResultStore;

/// What every worker shares.
pub(crate) struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub store: Arc<ResultStore>,
    pub converter: Arc<dyn Converter>,
    pub conversion_timeout: Option<Duration>,
}

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub(crate) fn spawn(n: usize, ctx: Arc<WorkerContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let ctx = Arc::clone(&ctx);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, ctx, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Ask every worker to stop after its current task.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait up to `grace` for all workers.
    ///
    /// Workers still converting after that are aborted, which drops their
    /// conversion (and kills its subprocess). Returns how many were aborted.
    pub async fn shutdown_and_join(self, grace: Duration) -> usize {
        self.request_shutdown();
        let deadline = tokio::time::Instant::now() + grace;

        let mut aborted = 0;
        for (worker_id, mut join) in self.joins.into_iter().enumerate() {
            if timeout_at(deadline, &mut join).await.is_err() {
                warn!(worker_id, "worker did not stop in time, aborting");
                join.abort();
                let _ = join.await;
                aborted += 1;
            }
        }
        aborted
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // dequeue は「待つ」ので shutdown と競合させる
        let task = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender (WorkerGroup) が drop された
                    break;
                }
                continue;
            }
            task = ctx.queue.dequeue() => task,
        };

        let Some(task) = task else {
            // queue closed
            break;
        };

        process(worker_id, &ctx, task).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn process(worker_id: usize, ctx: &WorkerContext, task: ConvertTask) {
    let task_id = task.task_id();
    let span = info_span!("convert", %task_id, worker_id, output_name = task.output_name());

    async move {
        if let Err(e) = ctx.store.mark_running(task_id).await {
            error!(error = %e, "store refused to start task, skipping");
            return;
        }
        info!(input = %task.input(), "conversion started");

        let started = Instant::now();
        let outcome = run_conversion(ctx, &task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                let bytes = payload.len();
                let result = ConvertResult::new(task_id, payload, task.output_name());
                match ctx.store.put(result).await {
                    Ok(()) => info!(elapsed_ms, bytes, "conversion succeeded"),
                    Err(e) => error!(error = %e, "result rejected by store"),
                }
            }
            Err(err) => {
                warn!(elapsed_ms, error = %err, "conversion failed");
                if let Err(e) = ctx.store.fail(task_id, err.to_string()).await {
                    error!(error = %e, "failure rejected by store");
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Aborts the wrapped task when dropped (e.g. when the worker itself is aborted).
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the converter on its own task so a panic is contained, bounded by the
/// configured timeout.
async fn run_conversion(ctx: &WorkerContext, task: &ConvertTask) -> Result<Vec<u8>, ConversionError> {
    let converter = Arc::clone(&ctx.converter);
    let input = task.input().clone();
    let mut handle = AbortOnDrop(tokio::spawn(async move { converter.convert(&input).await }));

    let joined = match ctx.conversion_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle.0).await {
            Ok(joined) => joined,
            Err(_) => return Err(ConversionError::TimedOut(limit)),
        },
        None => (&mut handle.0).await,
    };

    joined.unwrap_or_else(|e| Err(ConversionError::Panicked(e.to_string())))
}
