//! DeadLetterMonitor - dead-letter queue のメッセージを処理する
//!
//! failed のタスクを dead_letter に確定させ、診断イベントとメトリクスを発行します。
//! best-effort な診断処理なので、1 件の失敗でバッチ全体を止めません。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::batch::{BatchHandler, BatchReport, MessageOutcome};
use crate::domain::{
    DeadLetterMessage, DeadLetterReport, Delivery, DomainEvent, MetricRecord, ReboundError,
    TaskPatch, TaskStatus,
};
use crate::ports::{Clock, EventSink, StatusUpdate, TaskStore};

pub struct DeadLetterMonitor {
    store: Arc<dyn TaskStore>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl DeadLetterMonitor {
    pub fn new(store: Arc<dyn TaskStore>, events: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            events,
            clock,
        }
    }

    /// Handle a batch. Never fails: every per-message error is logged and
    /// counted as skipped.
    pub async fn handle_batch(&self, batch: &[Delivery]) -> BatchReport {
        let mut report = BatchReport::default();
        for delivery in batch {
            match self.handle_message(delivery).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    error!(
                        message_id = %delivery.message_id,
                        error = %err,
                        body = %delivery.body,
                        "failed to process dead letter message"
                    );
                    report.record(MessageOutcome::Skipped);
                }
            }
        }
        report
    }

    pub async fn handle_message(&self, delivery: &Delivery) -> Result<MessageOutcome, ReboundError> {
        let message = DeadLetterMessage::decode(&delivery.body)?;
        let task_id = message.task_id();

        let Some(task) = self.store.get(task_id).await? else {
            warn!(task_id = %task_id, "dead letter for unknown task, skipping");
            return Ok(MessageOutcome::Skipped);
        };

        if task.status == TaskStatus::DeadLetter {
            debug!(task_id = %task_id, "task already in dead letter, ignoring");
            return Ok(MessageOutcome::Duplicate);
        }

        let update = self
            .store
            .update_status(
                task_id,
                TaskStatus::DeadLetter,
                TaskPatch::dead_lettered(self.clock.now(), task.retry_count),
                TaskStatus::DeadLetter.allowed_predecessors(),
            )
            .await?;

        let task = match update {
            StatusUpdate::Applied(task) => task,
            StatusUpdate::Rejected {
                current: TaskStatus::DeadLetter,
            } => {
                debug!(task_id = %task_id, "task already in dead letter, ignoring");
                return Ok(MessageOutcome::Duplicate);
            }
            StatusUpdate::Rejected { current } => {
                warn!(
                    task_id = %task_id,
                    status = %current,
                    "dead letter for a task that has not failed, skipping"
                );
                return Ok(MessageOutcome::Skipped);
            }
        };

        info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            "task quarantined"
        );

        let report = DeadLetterReport::new(&task, &message);
        let metric = MetricRecord::failed_permanently(&report);
        self.events
            .emit(&DomainEvent::TaskDeadLettered(report))
            .await?;
        self.events.emit(&DomainEvent::Metric(metric)).await?;

        Ok(MessageOutcome::Quarantined)
    }
}

#[async_trait]
impl BatchHandler for DeadLetterMonitor {
    fn name(&self) -> &'static str {
        "dead_letter_monitor"
    }

    async fn handle(&self, batch: &[Delivery]) -> Result<BatchReport, ReboundError> {
        Ok(self.handle_batch(batch).await)
    }
}
