//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / transport / executor は必須。足りなければ build() が BuildError を返す
//! - clock / event sink / decider は省略可能（SystemClock, TracingEventSink, config 由来の RetryDecider）
//! - config は build() 時に validate() される

use std::sync::Arc;

use super::gateway::SubmissionGateway;
use super::monitor::DeadLetterMonitor;
use super::orchestrator::RetryOrchestrator;
use super::worker_loop::{WorkerGroup, WorkerOptions};
use crate::config::{Config, ConfigError};
use crate::domain::{Decider, QueueName, RetryDecider};
use crate::impls::TracingEventSink;
use crate::ports::{
    Clock, EventSink, MessageSource, QueueTransport, SystemClock, TaskExecutor, TaskStore,
};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing required component: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .store(store)
///     .transport(transport)
///     .executor(executor)
///     .build()?;
/// ```
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn TaskStore>>,
    transport: Option<Arc<dyn QueueTransport>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    events: Option<Arc<dyn EventSink>>,
    decider: Option<Arc<dyn Decider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            executor: None,
            events: None,
            decider: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let store = self.store.ok_or(BuildError::Missing("task store"))?;
        let transport = self.transport.ok_or(BuildError::Missing("queue transport"))?;
        let executor = self.executor.ok_or(BuildError::Missing("task executor"))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));
        let decider = self.decider.unwrap_or_else(|| {
            Arc::new(RetryDecider::new(
                self.config.retry.max_retries,
                self.config.retry.backoff.clone(),
            ))
        });

        let gateway = SubmissionGateway::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&clock),
            self.config.stage,
        );
        let orchestrator = RetryOrchestrator::new(
            Arc::clone(&store),
            transport,
            executor,
            decider,
            Arc::clone(&clock),
        );
        let monitor = DeadLetterMonitor::new(store, events, clock);

        Ok(App {
            gateway,
            orchestrator: Arc::new(orchestrator),
            monitor: Arc::new(monitor),
            config: self.config,
        })
    }
}

/// App は組み立て済みのコンポーネント一式
pub struct App {
    pub gateway: SubmissionGateway,
    pub orchestrator: Arc<RetryOrchestrator>,
    pub monitor: Arc<DeadLetterMonitor>,
    pub config: Config,
}

/// Worker groups for both queues.
pub struct Workers {
    pub orchestrator: WorkerGroup,
    pub monitor: WorkerGroup,
}

impl Workers {
    pub async fn shutdown_and_join(self) {
        self.orchestrator.request_shutdown();
        self.monitor.request_shutdown();
        self.orchestrator.shutdown_and_join().await;
        self.monitor.shutdown_and_join().await;
    }
}

impl App {
    /// Start `worker.concurrency` orchestrator workers on the main queue and
    /// one monitor worker on the dead-letter queue.
    pub fn spawn_workers(&self, source: Arc<dyn MessageSource>) -> Workers {
        let options = WorkerOptions::from(&self.config.worker);
        let orchestrator = WorkerGroup::spawn(
            self.config.worker.concurrency,
            QueueName::Main,
            Arc::clone(&source),
            self.orchestrator.clone(),
            options,
        );
        let monitor = WorkerGroup::spawn(1, QueueName::DeadLetter, source, self.monitor.clone(), options);
        Workers {
            orchestrator,
            monitor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{
        InMemoryQueueTransport, InMemoryTaskStore, SimulatedExecutor, SimulationSettings,
    };

    fn builder(config: Config) -> AppBuilder {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        AppBuilder::new(config)
            .store(Arc::new(InMemoryTaskStore::new(clock.clone())))
            .transport(Arc::new(InMemoryQueueTransport::new(clock.clone())))
            .executor(Arc::new(SimulatedExecutor::new(
                SimulationSettings::default(),
                clock.clone(),
            )))
            .clock(clock)
    }

    #[test]
    fn build_with_all_required_components() {
        let app = builder(Config::default()).build().unwrap();
        assert_eq!(app.config.retry.max_retries, 3);
    }

    #[test]
    fn missing_store_fails_fast() {
        let result = AppBuilder::new(Config::default())
            .transport(Arc::new(InMemoryQueueTransport::default()))
            .build();
        assert!(matches!(result, Err(BuildError::Missing("task store"))));
    }

    #[test]
    fn missing_executor_fails_fast() {
        let result = AppBuilder::new(Config::default())
            .store(Arc::new(InMemoryTaskStore::default()))
            .transport(Arc::new(InMemoryQueueTransport::default()))
            .build();
        assert!(matches!(result, Err(BuildError::Missing("task executor"))));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let mut config = Config::default();
        config.worker.batch_size = 0;
        assert!(matches!(
            builder(config).build(),
            Err(BuildError::Config(ConfigError::Invalid(_)))
        ));
    }
}
