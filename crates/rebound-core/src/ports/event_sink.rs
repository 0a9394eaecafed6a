//! EventSink port - ドメインイベントの送信先
//!
//! # 実装
//! - TracingEventSink: 構造化ログとして出力（デフォルト）
//! - MemoryEventSink: テスト用に保持するだけ

use async_trait::async_trait;

use crate::domain::{DomainEvent, ReboundError};

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &DomainEvent) -> Result<(), ReboundError>;
}
