//! Errors - エラー型と分類
//!
//! 呼び出し側は `ErrorKind` を見て「skip するか」「escalate するか」を
//! 判断します（文字列マッチは不要）。

use serde::Serialize;
use thiserror::Error;

use super::ids::TaskId;

/// ErrorKind は処理エラーの運用分類
///
/// - Parse / NotFound / Conflict: メッセージ単位の問題。ログを出して skip
/// - TransientIo / FatalIo: store や transport の障害。呼び出し元に返して再配送させる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    NotFound,
    Conflict,
    TransientIo,
    FatalIo,
}

#[derive(Debug, Error)]
pub enum ReboundError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task already exists: {0}")]
    Conflict(TaskId),

    #[error("transient I/O failure in {component}: {message}")]
    TransientIo {
        component: &'static str,
        message: String,
    },

    #[error("fatal I/O failure in {component}: {message}")]
    FatalIo {
        component: &'static str,
        message: String,
    },
}

impl ReboundError {
    pub fn transient(component: &'static str, message: impl ToString) -> Self {
        Self::TransientIo {
            component,
            message: message.to_string(),
        }
    }

    pub fn fatal(component: &'static str, message: impl ToString) -> Self {
        Self::FatalIo {
            component,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::TransientIo { .. } => ErrorKind::TransientIo,
            Self::FatalIo { .. } => ErrorKind::FatalIo,
        }
    }

    /// Message-level problem: log it and move on to the next message.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Parse | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }

    /// Infrastructure problem: hand it back so the transport redelivers.
    pub fn should_escalate(&self) -> bool {
        !self.is_skippable()
    }
}

/// Failure reported by a task executor. Always retryable from the
/// orchestrator's point of view; the decider alone decides when to stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ReboundError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
