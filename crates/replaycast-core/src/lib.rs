//! replaycast-core
//!
//! Asynchronous conversion of game replays into videos.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, result, state, errors）
//! - **ports**: 抽象化レイヤー（Converter, Clock, IdGenerator）
//! - **queue**: 有界 FIFO キュー（満杯なら即座に拒否）
//! - **store**: 結果ストア（write-once、retention による回収）
//! - **app**: TaskManager と worker / gc ループ
//! - **impls**: slp2mp4 + ffmpeg による Converter 実装
//! - **config**: 設定（serde / 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{ManagerBuilder, ManagerStats, TaskManager};
pub use config::{ConverterConfig, ManagerConfig};
pub use domain::{
    BuildError, ConversionError, ConvertResult, InputRef, LifecycleError, SubmitError, TaskId,
    TaskStatus, WaitError,
};
pub use impls::Slp2Mp4Converter;
pub use ports::Converter;
pub use store::RetentionPolicy;
