//! App - アプリケーション層
//!
//! ports を組み合わせてタスクのライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **SubmissionGateway**: 新規タスクの受付
//! - **RetryOrchestrator**: main queue の処理（実行・リトライ・失敗確定）
//! - **DeadLetterMonitor**: dead-letter queue の処理（隔離・診断）
//! - **WorkerGroup**: キューから BatchHandler へバッチを流すループ
//! - **AppBuilder**: ワイヤリングと起動時検証

pub mod batch;
pub mod builder;
pub mod gateway;
pub mod monitor;
pub mod orchestrator;
pub mod worker_loop;

pub use self::batch::{BatchHandler, BatchReport, MessageOutcome};
pub use self::builder::{App, AppBuilder, BuildError, Workers};
pub use self::gateway::{ApiResponse, GatewayError, SubmissionGateway, SubmitReceipt};
pub use self::monitor::DeadLetterMonitor;
pub use self::orchestrator::RetryOrchestrator;
pub use self::worker_loop::{WorkerGroup, WorkerOptions};
