//! RetryOrchestrator - main queue のメッセージを処理する
//!
//! # フロー（1 メッセージ）
//! 1. body を WorkMessage として decode、store から task を取得
//! 2. 終端状態なら何もしない（重複配送）
//! 3. failed なら dead-letter メッセージを再送（store 書き込み後に publish が落ちたケース）
//!    retry_scheduled で message の retry_count が古ければ何もしない（再配送された旧メッセージ）
//! 4. processing へ条件付き遷移 → executor 実行
//! 5. 成功: completed
//! 6. 失敗: retry_count を原子的に +1 → Decider → retry_scheduled + 遅延再投入、または failed + DLQ publish
//!
//! store 書き込みは常に publish より先。publish が失敗したらエラーを返し、
//! transport の再配送に任せます。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::batch::{BatchHandler, BatchReport, MessageOutcome};
use crate::domain::{
    DeadLetterMessage, Decider, Decision, Delivery, ExecutionError, QueueName, ReboundError, Task,
    TaskPatch, TaskStatus, WorkMessage,
};
use crate::ports::{Clock, QueueTransport, StatusUpdate, TaskExecutor, TaskStore};

pub struct RetryOrchestrator {
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn QueueTransport>,
    executor: Arc<dyn TaskExecutor>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
}

impl RetryOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn QueueTransport>,
        executor: Arc<dyn TaskExecutor>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transport,
            executor,
            decider,
            clock,
        }
    }

    /// Handle a batch in order.
    ///
    /// Message-level errors are logged and skipped. The first store or
    /// transport error aborts the batch and is returned for redelivery.
    pub async fn handle_batch(&self, batch: &[Delivery]) -> Result<BatchReport, ReboundError> {
        let mut report = BatchReport::default();
        for delivery in batch {
            match self.handle_message(delivery).await {
                Ok(outcome) => report.record(outcome),
                Err(err) if err.is_skippable() => {
                    warn!(
                        message_id = %delivery.message_id,
                        error = %err,
                        body = %delivery.body,
                        "skipping work message"
                    );
                    report.record(MessageOutcome::Skipped);
                }
                Err(err) => {
                    error!(
                        message_id = %delivery.message_id,
                        receive_count = delivery.receive_count,
                        error = %err,
                        "work batch failed, handing back for redelivery"
                    );
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    pub async fn handle_message(&self, delivery: &Delivery) -> Result<MessageOutcome, ReboundError> {
        let message = WorkMessage::decode(&delivery.body)?;
        let task_id = &message.task_id;

        let Some(task) = self.store.get(task_id).await? else {
            return Err(ReboundError::NotFound(task_id.clone()));
        };

        if task.status.is_terminal() {
            debug!(task_id = %task_id, status = %task.status, "task already terminal, ignoring");
            return Ok(MessageOutcome::Duplicate);
        }

        if task.status == TaskStatus::Failed {
            info!(task_id = %task_id, "failed task redelivered, republishing dead letter");
            self.publish_dead_letter(&task).await?;
            return Ok(MessageOutcome::Republished);
        }

        // A retry message always carries the post-increment count; anything older
        // belongs to an attempt whose retry is already scheduled.
        if task.status == TaskStatus::RetryScheduled && message.retry_count < task.retry_count {
            debug!(
                task_id = %task_id,
                message_retry_count = message.retry_count,
                retry_count = task.retry_count,
                "stale work message for a scheduled retry, ignoring"
            );
            return Ok(MessageOutcome::Duplicate);
        }

        let started = self.store.update_status(
            task_id,
            TaskStatus::Processing,
            TaskPatch::processing_started(self.clock.now()),
            TaskStatus::Processing.allowed_predecessors(),
        );
        let task = match started.await? {
            StatusUpdate::Applied(task) => task,
            StatusUpdate::Rejected { current } => {
                debug!(task_id = %task_id, status = %current, "task moved on, ignoring");
                return Ok(MessageOutcome::Duplicate);
            }
        };

        info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            receive_count = delivery.receive_count,
            "processing task"
        );

        match self.executor.execute(&task).await {
            Ok(result) => self.complete(&task, result).await,
            Err(err) => self.record_failure(&task, err).await,
        }
    }

    async fn complete(
        &self,
        task: &Task,
        result: serde_json::Value,
    ) -> Result<MessageOutcome, ReboundError> {
        let update = self
            .store
            .update_status(
                &task.task_id,
                TaskStatus::Completed,
                TaskPatch::completed(self.clock.now(), result),
                TaskStatus::Completed.allowed_predecessors(),
            )
            .await?;

        match update {
            StatusUpdate::Applied(_) => {
                info!(task_id = %task.task_id, retry_count = task.retry_count, "task completed");
                Ok(MessageOutcome::Completed)
            }
            StatusUpdate::Rejected { current } => {
                debug!(task_id = %task.task_id, status = %current, "completion lost the race");
                Ok(MessageOutcome::Duplicate)
            }
        }
    }

    async fn record_failure(
        &self,
        task: &Task,
        err: ExecutionError,
    ) -> Result<MessageOutcome, ReboundError> {
        let task_id = &task.task_id;
        let counted = self.store.increment_retry_count(task_id).await?;

        match self.decider.decide(counted.retry_count, &err) {
            Decision::MarkFailed {
                retry_count,
                reason,
            } => {
                let update = self
                    .store
                    .update_status(
                        task_id,
                        TaskStatus::Failed,
                        TaskPatch::failed(self.clock.now(), err.message(), retry_count, reason),
                        TaskStatus::Failed.allowed_predecessors(),
                    )
                    .await?;
                let StatusUpdate::Applied(failed) = update else {
                    debug!(task_id = %task_id, "failure already recorded elsewhere");
                    return Ok(MessageOutcome::Duplicate);
                };

                warn!(
                    task_id = %task_id,
                    retry_count,
                    error = %err,
                    "retries exhausted, task failed"
                );
                self.publish_dead_letter(&failed).await?;
                Ok(MessageOutcome::Failed)
            }
            Decision::Retry {
                retry_count,
                delay,
                reason,
            } => {
                let now = self.clock.now();
                let next_retry_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(now);

                let update = self
                    .store
                    .update_status(
                        task_id,
                        TaskStatus::RetryScheduled,
                        TaskPatch::retry_scheduled(now, err.message(), retry_count, next_retry_at),
                        TaskStatus::RetryScheduled.allowed_predecessors(),
                    )
                    .await?;
                let StatusUpdate::Applied(scheduled) = update else {
                    debug!(task_id = %task_id, "retry already scheduled elsewhere");
                    return Ok(MessageOutcome::Duplicate);
                };

                self.enqueue_retry(&scheduled, delay).await?;
                info!(
                    task_id = %task_id,
                    retry_count,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    reason = %reason,
                    "retry scheduled"
                );
                Ok(MessageOutcome::RetryScheduled)
            }
        }
    }

    async fn enqueue_retry(&self, task: &Task, delay: Duration) -> Result<(), ReboundError> {
        let body = WorkMessage::from_task(task).encode()?;
        self.transport.enqueue(QueueName::Main, body, delay).await?;
        Ok(())
    }

    async fn publish_dead_letter(&self, task: &Task) -> Result<(), ReboundError> {
        let final_error = task.last_error.clone().unwrap_or_default();
        let body = DeadLetterMessage::from_task(task, final_error).encode()?;
        let message_id = self
            .transport
            .enqueue(QueueName::DeadLetter, body, Duration::ZERO)
            .await?;
        info!(
            task_id = %task.task_id,
            retry_count = task.retry_count,
            message_id = %message_id,
            "dead letter published"
        );
        Ok(())
    }
}

#[async_trait]
impl BatchHandler for RetryOrchestrator {
    fn name(&self) -> &'static str {
        "orchestrator"
    }

    async fn handle(&self, batch: &[Delivery]) -> Result<BatchReport, ReboundError> {
        self.handle_batch(batch).await
    }
}
