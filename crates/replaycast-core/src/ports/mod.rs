//! Ports - 抽象化レイヤー
//!
//! task manager が外部（時計、ID 発行、変換プロセス）に依存する箇所を
//! trait として切り出しています。テストでは差し替えて使います。

pub mod clock;
pub mod converter;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::converter::Converter;
pub use self::id_generator::{IdGenerator, UlidGenerator};
