//! App - アプリケーション層
//!
//! queue / store / converter を組み合わせてタスク管理を実装します。
//!
//! # 主要コンポーネント
//! - **ManagerBuilder**: TaskManager の構築とワイヤリング
//! - **TaskManager**: submit / queue_depth / fetch_result の窓口と start/stop
//! - **WorkerGroup**: タスク実行ループ（dequeue→mark_running→convert→put/fail）
//! - **GcLoop**: 期限切れ結果の回収

pub mod builder;
pub mod gc_loop;
pub mod manager;
pub mod status;
pub mod worker_loop;

pub use self::builder::ManagerBuilder;
pub use self::gc_loop::GcLoop;
pub use self::manager::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, STOPPED_REASON, TaskManager};
pub use self::status::ManagerStats;
pub use self::worker_loop::WorkerGroup;
