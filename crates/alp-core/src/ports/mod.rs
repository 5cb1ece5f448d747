//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。
//! 時刻・待機・ID 生成・イベント記録・状態の永続化を trait として切り出し、
//! 実装は `impls` に置く。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod sleeper;
pub mod state_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, EventSinkError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::sleeper::{Sleeper, ThreadSleeper};
pub use self::state_store::{IterationStateStore, StoreError};
