//! TaskStore port - タスクの正本（source of truth）
//!
//! 全ハンドラが共有する唯一の可変リソース。
//!
//! # 設計原則
//! - 状態遷移は「期待する直前状態」付きの条件付き更新（重複配送に対して冪等）
//! - retry_count の加算は read-modify-write ではなく原子的な increment
//! - レコードは削除しない（終端状態はそのまま監査記録になる）

use async_trait::async_trait;

use crate::domain::{ReboundError, Task, TaskId, TaskPatch, TaskStatus};

/// Result of a guarded status update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The guard matched; the stored record after the write.
    Applied(Task),

    /// The record was not in any expected status; nothing was written.
    Rejected { current: TaskStatus },
}

impl StatusUpdate {
    pub fn applied(self) -> Option<Task> {
        match self {
            StatusUpdate::Applied(task) => Some(task),
            StatusUpdate::Rejected { .. } => None,
        }
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Unconditional upsert.
    async fn put(&self, task: Task) -> Result<Task, ReboundError>;

    /// Insert only if the id is unused; otherwise `ReboundError::Conflict`.
    async fn put_new(&self, task: Task) -> Result<Task, ReboundError>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, ReboundError>;

    /// Move a task to `status` and merge `patch`, only if its current status
    /// is one of `expected`. An empty `expected` means unconditional.
    ///
    /// Fails with `ReboundError::NotFound` when the task does not exist.
    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        patch: TaskPatch,
        expected: &[TaskStatus],
    ) -> Result<StatusUpdate, ReboundError>;

    /// Atomic `retry_count += 1`; returns the record after the increment.
    async fn increment_retry_count(&self, task_id: &TaskId) -> Result<Task, ReboundError>;
}
