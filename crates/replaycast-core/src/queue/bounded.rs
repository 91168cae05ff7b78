//! Bounded in-memory FIFO.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::{ConvertTask, SubmitError};

/// In-memory queue state.
struct QueueState {
    /// Pending tasks, head is the oldest.
    items: VecDeque<ConvertTask>,

    /// Closed queues reject enqueue and wake every waiting worker.
    closed: bool,
}

/// Bounded FIFO of pending conversion tasks.
///
/// - `enqueue` never waits: at capacity it fails with `QueueFull`.
/// - `dequeue` is the only suspending operation and is meant for workers.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the tail.
    pub async fn enqueue(&self, task: ConvertTask) -> Result<(), SubmitError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(SubmitError::NotRunning);
            }
            if state.items.len() >= self.capacity {
                return Err(SubmitError::QueueFull {
                    capacity: self.capacity,
                });
            }
            debug!(task_id = %task.task_id(), depth = state.items.len() + 1, "enqueued");
            state.items.push_back(task);
        }

        // Notify outside the lock
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the head, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<ConvertTask> {
        loop {
            // 先に登録しておかないと close() の notify_waiters を取りこぼす
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }
                if let Some(task) = state.items.pop_front() {
                    return Some(task);
                }
            }

            notified.await;
        }
    }

    /// Number of pending (not yet dequeued) tasks. A snapshot.
    pub async fn depth(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Stop accepting tasks and hand back whatever was still pending.
    ///
    /// Workers blocked in `dequeue` wake up and get `None`.
    pub async fn close(&self) -> Vec<ConvertTask> {
        let drained: Vec<ConvertTask> = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.notify.notify_waiters();
        drained
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
