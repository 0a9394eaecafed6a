//! rebound-core
//!
//! Task lifecycle and retry orchestration over an at-least-once queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, status, message, backoff, decision, errors, events）
//! - **ports**: 抽象化レイヤー（TaskStore, QueueTransport, MessageSource, TaskExecutor, EventSink, Clock）
//! - **impls**: 実装（in-memory store / transport、デモ用 executor、event sink）
//! - **app**: アプリケーションロジック（gateway, orchestrator, monitor, worker_loop, builder）
//! - **config**: 設定の読み込みと検証
//! - **observability**: tracing の初期化と状態集計

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
