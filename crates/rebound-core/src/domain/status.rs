//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Processing -> RetryScheduled -> Processing (loop until max_retries)
/// - Processing -> Failed -> DeadLetter
///
/// Processing -> Processing is allowed: a redelivered message may find the task
/// still marked as processing after a crash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Stored by the gateway, first work message enqueued.
    #[default]
    Pending,

    /// An orchestrator delivery is executing the task.
    Processing,

    /// Executor succeeded. Terminal.
    Completed,

    /// Waiting for a delayed work message (backoff).
    RetryScheduled,

    /// Retries exhausted, dead-letter message published (or about to be).
    Failed,

    /// Quarantined by the dead-letter monitor. Terminal.
    DeadLetter,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::DeadLetter)
    }

    /// Statuses a task may be in right before entering `self`.
    ///
    /// Used as the expected-prior-status guard for conditional store updates.
    pub fn allowed_predecessors(self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[],
            TaskStatus::Processing => &[
                TaskStatus::Pending,
                TaskStatus::RetryScheduled,
                TaskStatus::Processing,
            ],
            TaskStatus::Completed | TaskStatus::RetryScheduled | TaskStatus::Failed => {
                &[TaskStatus::Processing]
            }
            TaskStatus::DeadLetter => &[TaskStatus::Failed],
        }
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        next.allowed_predecessors().contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::RetryScheduled => "retry_scheduled",
            TaskStatus::Failed => "failed",
            TaskStatus::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
