//! Queue-level envelopes.
//!
//! Messages are not persisted entities: the store is the source of truth and a
//! message only says "look at this task again". Bodies travel as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ReboundError;
use super::ids::{MessageId, TaskId};
use super::task::Task;

/// The two channels the transport offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Main,
    DeadLetter,
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueName::Main => f.write_str("main"),
            QueueName::DeadLetter => f.write_str("dead_letter"),
        }
    }
}

/// Work message on the main queue.
///
/// `retry_count` echoes the last count the sender knew about; it may lag the
/// store and is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    pub task_id: TaskId,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WorkMessage {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            payload: task.payload.clone(),
            retry_count: task.retry_count,
            created_at: Some(task.created_at),
        }
    }

    pub fn decode(body: &str) -> Result<Self, ReboundError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn encode(&self) -> Result<String, ReboundError> {
        serde_json::to_string(self).map_err(|e| ReboundError::fatal("codec", e))
    }
}

/// Message on the dead-letter queue: the work message plus the final failure.
///
/// `final_error` / `failed_at` are optional on decode so a hand-written or
/// older message still reaches the monitor; the orchestrator always sets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    #[serde(flatten)]
    pub work: WorkMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl DeadLetterMessage {
    pub fn from_task(task: &Task, final_error: impl Into<String>) -> Self {
        Self {
            work: WorkMessage::from_task(task),
            final_error: Some(final_error.into()),
            failed_at: task.failed_at,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.work.task_id
    }

    pub fn decode(body: &str) -> Result<Self, ReboundError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn encode(&self) -> Result<String, ReboundError> {
        serde_json::to_string(self).map_err(|e| ReboundError::fatal("codec", e))
    }
}

/// One message handed to a batch handler by a message source.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub queue: QueueName,

    /// How many times this message has been handed out (1 on first delivery).
    pub receive_count: u32,

    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, TaskPatch, TaskStatus};
    use chrono::TimeZone;
    use serde_json::json;

    fn failed_task() -> Task {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut task = Task::new(TaskId::parse("T1").unwrap(), json!({"n": 1}), t0);
        task.apply(
            TaskStatus::Failed,
            TaskPatch::failed(t0, "boom", 3, "Max retries exceeded"),
            t0,
        );
        task
    }

    #[test]
    fn work_message_uses_camel_case() {
        let msg = WorkMessage::from_task(&failed_task());
        let v: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(v["taskId"], "T1");
        assert_eq!(v["retryCount"], 3);
        assert_eq!(v["payload"], json!({"n": 1}));
    }

    #[test]
    fn work_message_needs_only_task_id() {
        let msg = WorkMessage::decode(r#"{"taskId":"T9"}"#).unwrap();
        assert_eq!(msg.task_id.as_str(), "T9");
        assert_eq!(msg.retry_count, 0);
    }

    #[test]
    fn malformed_bodies_are_parse_errors() {
        for body in ["not json", "{}", r#"{"taskId": 12}"#, r#"{"taskId": "  "}"#] {
            let err = WorkMessage::decode(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "body={body}");
        }
    }

    #[test]
    fn dead_letter_message_is_flat() {
        let msg = DeadLetterMessage::from_task(&failed_task(), "boom");
        let v: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(v["taskId"], "T1");
        assert_eq!(v["retryCount"], 3);
        assert_eq!(v["finalError"], "boom");
        assert!(v.get("failedAt").is_some());

        let back = DeadLetterMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn dead_letter_message_tolerates_missing_failure_fields() {
        let msg = DeadLetterMessage::decode(r#"{"taskId":"T2"}"#).unwrap();
        assert_eq!(msg.task_id().as_str(), "T2");
        assert!(msg.final_error.is_none());
        assert!(msg.failed_at.is_none());
    }
}
