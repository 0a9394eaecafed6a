//! IdGenerator port - ID 生成の抽象化
//!
//! TaskId は submitter が決めるので、ここで払い出すのは MessageId だけです。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp を取る）

use ulid::Ulid;

use crate::domain::MessageId;
use crate::ports::Clock;

/// IdGenerator は transport が使う MessageId を生成
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        MessageId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
