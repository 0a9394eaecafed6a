//! InMemoryTaskStore - 開発・テスト用の TaskStore
//!
//! 1 つの tokio Mutex で HashMap を守るだけの実装。
//! 条件付き更新と increment はロックの中で完結するので、並行ハンドラから
//! 呼ばれても lost update は起きません。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ReboundError, Task, TaskId, TaskPatch, TaskStatus};
use crate::observability::StatusCounts;
use crate::ports::{Clock, StatusUpdate, SystemClock, TaskStore};

pub struct InMemoryTaskStore {
    records: Mutex<HashMap<TaskId, Task>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of tasks per status.
    pub async fn counts(&self) -> StatusCounts {
        let records = self.records.lock().await;
        let mut counts = StatusCounts::default();
        for task in records.values() {
            counts.record(task.status);
        }
        counts
    }

    /// All records, sorted by task id.
    pub async fn snapshot(&self) -> Vec<Task> {
        let records = self.records.lock().await;
        let mut tasks: Vec<Task> = records.values().cloned().collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, mut task: Task) -> Result<Task, ReboundError> {
        task.updated_at = self.clock.now();
        let mut records = self.records.lock().await;
        records.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn put_new(&self, mut task: Task) -> Result<Task, ReboundError> {
        task.updated_at = self.clock.now();
        let mut records = self.records.lock().await;
        if records.contains_key(&task.task_id) {
            return Err(ReboundError::Conflict(task.task_id));
        }
        records.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, ReboundError> {
        let records = self.records.lock().await;
        Ok(records.get(task_id).cloned())
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        patch: TaskPatch,
        expected: &[TaskStatus],
    ) -> Result<StatusUpdate, ReboundError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let Some(task) = records.get_mut(task_id) else {
            return Err(ReboundError::NotFound(task_id.clone()));
        };

        if !expected.is_empty() && !expected.contains(&task.status) {
            return Ok(StatusUpdate::Rejected {
                current: task.status,
            });
        }

        task.apply(status, patch, now);
        Ok(StatusUpdate::Applied(task.clone()))
    }

    async fn increment_retry_count(&self, task_id: &TaskId) -> Result<Task, ReboundError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let Some(task) = records.get_mut(task_id) else {
            return Err(ReboundError::NotFound(task_id.clone()));
        };

        task.retry_count += 1;
        task.updated_at = now;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::ports::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn id(raw: &str) -> TaskId {
        TaskId::parse(raw).unwrap()
    }

    fn store() -> (Arc<FixedClock>, InMemoryTaskStore) {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = InMemoryTaskStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn put_new_rejects_duplicates() {
        let (_, store) = store();
        store
            .put_new(Task::new(id("T1"), json!({}), t0()))
            .await
            .unwrap();

        let err = store
            .put_new(Task::new(id("T1"), json!({"other": true}), t0()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = store.get(&id("T1")).await.unwrap().unwrap();
        assert_eq!(stored.payload, json!({}));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let (_, store) = store();
        store.put(Task::new(id("T1"), json!(1), t0())).await.unwrap();
        store.put(Task::new(id("T1"), json!(2), t0())).await.unwrap();
        assert_eq!(store.get(&id("T1")).await.unwrap().unwrap().payload, json!(2));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (_, store) = store();
        assert_eq!(store.get(&id("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn guarded_update_applies_or_rejects() {
        let (clock, store) = store();
        store.put(Task::new(id("T1"), json!({}), t0())).await.unwrap();
        clock.advance(Duration::seconds(3));

        let applied = store
            .update_status(
                &id("T1"),
                TaskStatus::Processing,
                TaskPatch::processing_started(clock.now()),
                TaskStatus::Processing.allowed_predecessors(),
            )
            .await
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(applied.status, TaskStatus::Processing);
        assert_eq!(applied.updated_at, t0() + Duration::seconds(3));

        let rejected = store
            .update_status(
                &id("T1"),
                TaskStatus::DeadLetter,
                TaskPatch::dead_lettered(clock.now(), 0),
                &[TaskStatus::Failed],
            )
            .await
            .unwrap();
        assert_eq!(
            rejected,
            StatusUpdate::Rejected {
                current: TaskStatus::Processing
            }
        );
        let stored = store.get(&id("T1")).await.unwrap().unwrap();
        assert_eq!(stored.moved_to_dlq_at, None);
    }

    #[tokio::test]
    async fn empty_guard_is_unconditional() {
        let (_, store) = store();
        store.put(Task::new(id("T1"), json!({}), t0())).await.unwrap();
        let update = store
            .update_status(&id("T1"), TaskStatus::Failed, TaskPatch::default(), &[])
            .await
            .unwrap();
        assert!(matches!(update, StatusUpdate::Applied(_)));
    }

    #[tokio::test]
    async fn updating_a_missing_task_is_not_found() {
        let (_, store) = store();
        let err = store
            .update_status(&id("T9"), TaskStatus::Processing, TaskPatch::default(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = store.increment_retry_count(&id("T9")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn increment_returns_post_increment_value() {
        let (_, store) = store();
        store.put(Task::new(id("T1"), json!({}), t0())).await.unwrap();
        assert_eq!(store.increment_retry_count(&id("T1")).await.unwrap().retry_count, 1);
        assert_eq!(store.increment_retry_count(&id("T1")).await.unwrap().retry_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let (_, store) = store();
        let store = Arc::new(store);
        store.put(Task::new(id("T1"), json!({}), t0())).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment_retry_count(&id("T1")).await })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().unwrap().retry_count);
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<u32>>());
        assert_eq!(store.get(&id("T1")).await.unwrap().unwrap().retry_count, 50);
    }

    #[tokio::test]
    async fn counts_by_status() {
        let (clock, store) = store();
        for raw in ["A", "B", "C"] {
            store.put(Task::new(id(raw), json!({}), t0())).await.unwrap();
        }
        store
            .update_status(
                &id("A"),
                TaskStatus::Processing,
                TaskPatch::processing_started(clock.now()),
                &[],
            )
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 3);

        let ids: Vec<String> = store
            .snapshot()
            .await
            .into_iter()
            .map(|t| t.task_id.to_string())
            .collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }
}
