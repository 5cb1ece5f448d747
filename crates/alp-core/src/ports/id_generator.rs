//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::EventId;
use crate::ports::Clock;

/// IdGenerator は時刻順にソート可能な ID を生成
pub trait IdGenerator {
    fn generate_event_id(&self) -> EventId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// The timestamp half comes from the injected `Clock`, so a `FixedClock` pins it.
#[derive(Debug, Clone)]
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_event_id(&self) -> EventId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        EventId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
