//! TaskExecutor port - 実際の処理を行う外部コンポーネント
//!
//! executor 自身の副作用が冪等かどうかは executor 側の責任です。
//! コアは「同じメッセージを二度処理しても store が壊れない」ことだけを保証します。

use async_trait::async_trait;

use crate::domain::{ExecutionError, Task};

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task once. Any error counts as a failed attempt.
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError>;
}
