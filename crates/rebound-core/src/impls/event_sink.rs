//! EventSink 実装
//!
//! - TracingEventSink: イベントを構造化ログとして出力
//! - MemoryEventSink: イベントを Vec に貯める（テスト・デモ用）

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{DomainEvent, ReboundError};
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &DomainEvent) -> Result<(), ReboundError> {
        let body = serde_json::to_string(event).map_err(|e| ReboundError::fatal("event_sink", e))?;
        match event {
            DomainEvent::TaskDeadLettered(report) => {
                tracing::error!(
                    task_id = %report.task_id,
                    retry_count = report.retry_count,
                    last_error = %report.last_error,
                    time_to_failure_ms = ?report.time_to_failure_ms,
                    event = %body,
                    "task moved to dead letter queue"
                );
            }
            DomainEvent::Metric(record) => {
                tracing::info!(
                    metric = record.metric,
                    task_id = %record.task_id,
                    retry_count = record.retry_count,
                    time_to_failure_ms = ?record.time_to_failure_ms,
                    "metric"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: &DomainEvent) -> Result<(), ReboundError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
