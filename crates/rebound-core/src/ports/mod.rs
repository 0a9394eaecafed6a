//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。各 trait は外部システム
//! （task store, queue transport, executor, event sink）への境界です。
//!
//! # 設計原則
//! - Task Store が source of truth（正本）
//! - Queue Transport は「このタスクをもう一度見て」という通知だけを運ぶ
//! - すべての trait は `Send + Sync`（並行ハンドラから共有される）

pub mod clock;
pub mod delivery_queue;
pub mod event_sink;
pub mod executor;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::{MessageSource, QueueTransport};
pub use self::event_sink::EventSink;
pub use self::executor::TaskExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{StatusUpdate, TaskStore};

pub use crate::domain::ExecutionError;
