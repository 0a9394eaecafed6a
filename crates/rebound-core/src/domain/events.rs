//! Events - ドメインイベント
//!
//! Dead-Letter Monitor が発行する診断イベント。EventSink 経由で外部
//! （ログ、メトリクス基盤など）に送られます。

use serde::Serialize;

use super::ids::TaskId;
use super::message::DeadLetterMessage;
use super::task::{PhaseTimestamps, Task};

pub const FAILED_PERMANENTLY_METRIC: &str = "task_failed_permanently";

const UNKNOWN_ERROR: &str = "Unknown error";

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// タスクが dead_letter に確定した
    TaskDeadLettered(DeadLetterReport),

    /// 集計用のメトリクスレコード
    Metric(MetricRecord),
}

/// Full diagnostic for a quarantined task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterReport {
    pub task_id: TaskId,
    pub original_payload: serde_json::Value,
    pub retry_count: u32,
    pub last_error: String,
    pub timestamps: PhaseTimestamps,

    /// `failedAt - createdAt` in milliseconds; absent when the task never failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_failure_ms: Option<i64>,
}

impl DeadLetterReport {
    /// Build from the stored record after the dead-letter transition.
    ///
    /// The record is the source of truth; the message only fills gaps.
    pub fn new(task: &Task, message: &DeadLetterMessage) -> Self {
        let last_error = task
            .last_error
            .clone()
            .or_else(|| message.final_error.clone())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());

        Self {
            task_id: task.task_id.clone(),
            original_payload: task.payload.clone(),
            retry_count: task.retry_count,
            last_error,
            timestamps: task.phase_timestamps(),
            time_to_failure_ms: task.time_to_failure().map(|d| d.num_milliseconds()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub metric: &'static str,
    pub task_id: TaskId,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_failure_ms: Option<i64>,
}

impl MetricRecord {
    pub fn failed_permanently(report: &DeadLetterReport) -> Self {
        Self {
            metric: FAILED_PERMANENTLY_METRIC,
            task_id: report.task_id.clone(),
            retry_count: report.retry_count,
            time_to_failure_ms: report.time_to_failure_ms,
        }
    }
}

impl DomainEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            DomainEvent::TaskDeadLettered(report) => &report.task_id,
            DomainEvent::Metric(record) => &record.task_id,
        }
    }
}
