//! Task record and its typed partial update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::status::TaskStatus;

/// The durable record of one task.
///
/// Design:
/// - The task store owns this record; handlers only hold a copy for the
///   duration of one message.
/// - All mutations go through [`Task::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub payload: serde_json::Value,
    pub status: TaskStatus,

    /// Number of failed attempts so far. Only ever grows.
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_scheduled_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "movedToDLQAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub moved_to_dlq_at: Option<DateTime<Utc>>,

    /// When the most recently scheduled retry becomes visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dlq_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_retry_count: Option<u32>,
}

impl Task {
    pub fn new(task_id: TaskId, payload: serde_json::Value, created_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            payload,
            status: TaskStatus::Pending,
            retry_count: 0,
            last_error: None,
            result: None,
            created_at,
            updated_at: created_at,
            processing_started_at: None,
            completed_at: None,
            failed_at: None,
            retry_scheduled_at: None,
            moved_to_dlq_at: None,
            next_retry_at: None,
            failure_reason: None,
            dlq_reason: None,
            final_retry_count: None,
        }
    }

    /// Merge a status change and a patch into this record.
    ///
    /// - plain fields are overwritten when the patch carries a value
    /// - phase timestamps are only written the first time
    /// - `retry_count` never goes down
    pub fn apply(&mut self, status: TaskStatus, patch: TaskPatch, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;

        if let Some(count) = patch.retry_count {
            self.retry_count = self.retry_count.max(count);
        }
        if patch.last_error.is_some() {
            self.last_error = patch.last_error;
        }
        if patch.result.is_some() {
            self.result = patch.result;
        }
        if patch.next_retry_at.is_some() {
            self.next_retry_at = patch.next_retry_at;
        }
        if patch.failure_reason.is_some() {
            self.failure_reason = patch.failure_reason;
        }
        if patch.dlq_reason.is_some() {
            self.dlq_reason = patch.dlq_reason;
        }
        if patch.final_retry_count.is_some() {
            self.final_retry_count = patch.final_retry_count;
        }

        stamp_once(&mut self.processing_started_at, patch.processing_started_at);
        stamp_once(&mut self.completed_at, patch.completed_at);
        stamp_once(&mut self.failed_at, patch.failed_at);
        stamp_once(&mut self.retry_scheduled_at, patch.retry_scheduled_at);
        stamp_once(&mut self.moved_to_dlq_at, patch.moved_to_dlq_at);
    }

    pub fn phase_timestamps(&self) -> PhaseTimestamps {
        PhaseTimestamps {
            created_at: self.created_at,
            updated_at: self.updated_at,
            processing_started_at: self.processing_started_at,
            retry_scheduled_at: self.retry_scheduled_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
            moved_to_dlq_at: self.moved_to_dlq_at,
        }
    }

    /// `failed_at - created_at`, if the task has failed.
    pub fn time_to_failure(&self) -> Option<chrono::Duration> {
        self.failed_at.map(|failed_at| failed_at - self.created_at)
    }
}

fn stamp_once(slot: &mut Option<DateTime<Utc>>, value: Option<DateTime<Utc>>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Typed partial update for a [`Task`].
///
/// One optional field per mutable attribute; `None` leaves the attribute alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub retry_count: Option<u32>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub retry_scheduled_at: Option<DateTime<Utc>>,
    pub moved_to_dlq_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub dlq_reason: Option<String>,
    pub final_retry_count: Option<u32>,
}

impl TaskPatch {
    pub fn processing_started(now: DateTime<Utc>) -> Self {
        Self {
            processing_started_at: Some(now),
            ..Self::default()
        }
    }

    pub fn completed(now: DateTime<Utc>, result: serde_json::Value) -> Self {
        Self {
            completed_at: Some(now),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn retry_scheduled(
        now: DateTime<Utc>,
        error: impl Into<String>,
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
    ) -> Self {
        Self {
            retry_scheduled_at: Some(now),
            last_error: Some(error.into()),
            retry_count: Some(retry_count),
            next_retry_at: Some(next_retry_at),
            ..Self::default()
        }
    }

    pub fn failed(
        now: DateTime<Utc>,
        error: impl Into<String>,
        retry_count: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            failed_at: Some(now),
            last_error: Some(error.into()),
            retry_count: Some(retry_count),
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn dead_lettered(now: DateTime<Utc>, final_retry_count: u32) -> Self {
        Self {
            moved_to_dlq_at: Some(now),
            final_retry_count: Some(final_retry_count),
            dlq_reason: Some(DLQ_REASON.to_string()),
            ..Self::default()
        }
    }
}

pub const DLQ_REASON: &str = "Maximum retry attempts exceeded";

/// Every lifecycle timestamp of a task, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub retry_scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(rename = "movedToDLQAt")]
    pub moved_to_dlq_at: Option<DateTime<Utc>>,
}
