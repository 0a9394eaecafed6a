//! Queue transport port - at-least-once の配送キュー
//!
//! 送信側（QueueTransport）と受信側（MessageSource）を分けています。
//! orchestrator / gateway は送信しか使わず、受信は worker loop だけが使います。
//!
//! # 配送保証
//! - at-least-once: 同じメッセージが複数回届くことがある
//! - 遅延配送: `delay` 経過まで受信側に見えない
//! - 順序保証なし

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Delivery, MessageId, QueueName, ReboundError};

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Publish `body` to `queue`, invisible until `delay` has passed.
    async fn enqueue(
        &self,
        queue: QueueName,
        body: String,
        delay: Duration,
    ) -> Result<MessageId, ReboundError>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Take up to `max` visible messages, waiting at most `wait` for the first one.
    ///
    /// Returns an empty batch on timeout.
    async fn receive(
        &self,
        queue: QueueName,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, ReboundError>;

    /// Hand `deliveries` back to the queue, visible again after `delay`.
    async fn redeliver(
        &self,
        queue: QueueName,
        deliveries: Vec<Delivery>,
        delay: Duration,
    ) -> Result<(), ReboundError>;
}
