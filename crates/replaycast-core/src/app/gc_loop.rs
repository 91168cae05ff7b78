//! GCLoop - 期限切れ結果の回収
//!
//! retention ttl を過ぎた完了済みレコードを定期的に削除します。
//! Pending / Running は対象外。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::store::ResultStore;

/// Periodic sweep of expired results.
pub struct GcLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl GcLoop {
    pub fn spawn(store: Arc<ResultStore>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 最初の tick は即時なので捨てる
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let evicted = store.evict_expired().await;
                        if evicted > 0 {
                            info!(evicted, "evicted expired results");
                        }
                    }
                }
            }
            debug!("gc loop stopped");
        });

        Self { shutdown_tx, join }
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConvertResult, ConvertTask, InputRef, TaskId};
    use crate::ports::SystemClock;
    use crate::store::RetentionPolicy;
    use ulid::Ulid;

    #[tokio::test]
    async fn sweeps_expired_results_periodically() {
        let store = Arc::new(ResultStore::new(
            RetentionPolicy {
                ttl: Some(Duration::from_millis(10)),
                max_entries: None,
            },
            Arc::new(SystemClock),
        ));

        let task = ConvertTask::new(TaskId::from_ulid(Ulid::new()), InputRef::new("a.slp"), "a.mp4");
        let id = task.task_id();
        store.register(&task).await.unwrap();
        store.mark_running(id).await.unwrap();
        store.put(ConvertResult::new(id, vec![1], "a.mp4")).await.unwrap();

        let gc = GcLoop::spawn(Arc::clone(&store), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.status(id).await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        gc.stop().await;
    }
}
