//! Domain identifiers (strongly-typed IDs).
//!
//! - `TaskId`: submitter が決める文字列 ID（trim 済み・空文字不可）
//! - `MessageId`: transport が払い出す ULID ベースの ID
//!
//! ULID は時刻でソート可能なので、in-memory transport の履歴を
//! 送信順に並べるのにそのまま使えます。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use super::errors::ReboundError;

/// Identifier of a Task (primary key in the task store).
///
/// Always trimmed and never empty. Deserialization goes through the same
/// validation, so a work message with a blank `taskId` fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn parse(raw: &str) -> Result<Self, ReboundError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ReboundError::Parse("taskId must not be blank".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = ReboundError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one message accepted by the queue transport.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Ulid);

impl MessageId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for MessageId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}
