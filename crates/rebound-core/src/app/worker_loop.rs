//! WorkerGroup - キューからバッチを受け取り BatchHandler に渡すループ
//!
//! # フロー
//! 1. MessageSource::receive() で最大 batch_size 件を取得（poll_interval まで待つ）
//! 2. BatchHandler::handle()
//! 3. Err ならバッチ全体を visibility_timeout 後に再配送

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::batch::BatchHandler;
use crate::config::WorkerConfig;
use crate::domain::QueueName;
use crate::ports::MessageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            visibility_timeout: config.visibility_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `shutdown_and_join()` は処理中のバッチが終わるのを待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers consuming `queue`.
    pub fn spawn(
        n: usize,
        queue: QueueName,
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn BatchHandler>,
        options: WorkerOptions,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let source = Arc::clone(&source);
            let handler = Arc::clone(&handler);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, source, handler, options, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new batches. In-flight batches run to completion.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: QueueName,
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn BatchHandler>,
    options: WorkerOptions,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let name = handler.name();
    debug!(worker_id, handler = name, queue = %queue, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // receive は待つ可能性があるので shutdown と競合させる
        let received = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop されたら終了
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = source.receive(queue, options.batch_size, options.poll_interval) => received,
        };

        let batch = match received {
            Ok(batch) => batch,
            Err(e) => {
                warn!(worker_id, handler = name, error = %e, "receive failed");
                tokio::time::sleep(options.poll_interval).await;
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }

        if let Err(e) = handler.handle(&batch).await {
            warn!(
                worker_id,
                handler = name,
                size = batch.len(),
                error = %e,
                "batch failed, redelivering"
            );
            if let Err(e) = source
                .redeliver(queue, batch, options.visibility_timeout)
                .await
            {
                error!(worker_id, handler = name, error = %e, "redelivery failed");
            }
        }
    }

    debug!(worker_id, handler = name, "worker stopped");
}
