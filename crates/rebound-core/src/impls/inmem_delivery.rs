//! InMemoryQueueTransport - 開発・テスト用の配送キュー
//!
//! # 実装詳細
//! - キュー（main / dead_letter）ごとに ready(VecDeque) と scheduled(BinaryHeap)
//! - 遅延メッセージは visible_at が来たら ready に昇格
//! - 受信待ちは Notify と sleep_until の select（tokio::time なので pause したテストでも動く）
//! - 直近の送信履歴を上限付きで保持し、テストから検査できる（上限 0 で無効）

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{Delivery, MessageId, QueueName, ReboundError};
use crate::ports::{Clock, IdGenerator, MessageSource, QueueTransport, SystemClock, UlidGenerator};

/// One accepted `enqueue` call, as the sender asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub message_id: MessageId,
    pub body: String,

    /// Requested delay, before time scaling.
    pub delay: Duration,
}

/// Delayed message; reversed ordering turns the max-heap into "earliest first".
#[derive(Debug)]
struct Scheduled {
    visible_at: Instant,
    seq: u64,
    delivery: Delivery,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.visible_at == other.visible_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .visible_at
            .cmp(&self.visible_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    scheduled: BinaryHeap<Scheduled>,
    sent: VecDeque<SentMessage>,
}

impl QueueState {
    fn promote_visible(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.visible_at > now {
                break;
            }
            if let Some(entry) = self.scheduled.pop() {
                self.ready.push_back(entry.delivery);
            }
        }
    }
}

#[derive(Default)]
struct Lane {
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Send history kept per queue unless `with_history_limit` says otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

pub struct InMemoryQueueTransport {
    main: Lane,
    dead_letter: Lane,
    ids: UlidGenerator<Arc<dyn Clock>>,
    seq: AtomicU64,

    /// Multiplier applied to every delay (1.0 = real time, 0.0 = immediate).
    time_scale: f64,
    history_limit: usize,
}

impl InMemoryQueueTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            main: Lane::default(),
            dead_letter: Lane::default(),
            ids: UlidGenerator::new(clock),
            seq: AtomicU64::new(0),
            time_scale: 1.0,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Shrink or stretch every delay. Negative or non-finite values count as 0.
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = if time_scale.is_finite() {
            time_scale.max(0.0)
        } else {
            0.0
        };
        self
    }

    /// Keep at most `limit` sent messages per queue; 0 records nothing.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Most recent messages enqueued to `queue`, oldest first, up to the history limit.
    pub async fn sent(&self, queue: QueueName) -> Vec<SentMessage> {
        let state = self.lane(queue).state.lock().await;
        state.sent.iter().cloned().collect()
    }

    /// Messages waiting in `queue` (visible or delayed).
    pub async fn depth(&self, queue: QueueName) -> usize {
        let state = self.lane(queue).state.lock().await;
        state.ready.len() + state.scheduled.len()
    }

    fn lane(&self, queue: QueueName) -> &Lane {
        match queue {
            QueueName::Main => &self.main,
            QueueName::DeadLetter => &self.dead_letter,
        }
    }

    fn scaled(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.time_scale).unwrap_or(Duration::MAX)
    }

    fn push(&self, state: &mut QueueState, delivery: Delivery, delay: Duration) {
        let delay = self.scaled(delay);
        if delay.is_zero() {
            state.ready.push_back(delivery);
            return;
        }
        let now = Instant::now();
        state.scheduled.push(Scheduled {
            visible_at: instant_after(now, delay),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            delivery,
        });
    }
}

/// `at + by`, saturating at roughly a year out instead of overflowing.
fn instant_after(at: Instant, by: Duration) -> Instant {
    at.checked_add(by)
        .unwrap_or_else(|| at + Duration::from_secs(86_400 * 365))
}

impl Default for InMemoryQueueTransport {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn enqueue(
        &self,
        queue: QueueName,
        body: String,
        delay: Duration,
    ) -> Result<MessageId, ReboundError> {
        let message_id = self.ids.generate_message_id();
        let lane = self.lane(queue);
        {
            let mut state = lane.state.lock().await;
            if self.history_limit > 0 {
                if state.sent.len() >= self.history_limit {
                    state.sent.pop_front();
                }
                state.sent.push_back(SentMessage {
                    message_id,
                    body: body.clone(),
                    delay,
                });
            }
            let delivery = Delivery {
                message_id,
                queue,
                receive_count: 0,
                body,
            };
            self.push(&mut state, delivery, delay);
        }
        lane.notify.notify_one();
        Ok(message_id)
    }
}

#[async_trait]
impl MessageSource for InMemoryQueueTransport {
    async fn receive(
        &self,
        queue: QueueName,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, ReboundError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let lane = self.lane(queue);
        let deadline = instant_after(Instant::now(), wait);

        loop {
            let next_visible = {
                let mut state = lane.state.lock().await;
                state.promote_visible(Instant::now());

                if !state.ready.is_empty() {
                    let n = max.min(state.ready.len());
                    let batch: Vec<Delivery> = state
                        .ready
                        .drain(..n)
                        .map(|mut delivery| {
                            delivery.receive_count += 1;
                            delivery
                        })
                        .collect();
                    let leftover = !state.ready.is_empty();
                    drop(state);
                    if leftover {
                        lane.notify.notify_one();
                    }
                    return Ok(batch);
                }

                state.scheduled.peek().map(|entry| entry.visible_at)
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = lane.notify.notified() => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn redeliver(
        &self,
        queue: QueueName,
        deliveries: Vec<Delivery>,
        delay: Duration,
    ) -> Result<(), ReboundError> {
        if deliveries.is_empty() {
            return Ok(());
        }
        let lane = self.lane(queue);
        {
            let mut state = lane.state.lock().await;
            for delivery in deliveries {
                self.push(&mut state, delivery, delay);
            }
        }
        lane.notify.notify_one();
        Ok(())
    }
}
