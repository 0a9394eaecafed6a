//! SimulatedExecutor - デモ用の executor
//!
//! ランダムな処理時間のあと、一定確率でランダムなエラーを返します。
//! 本番の executor はこの port を別途実装して差し替えます。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::config::ExecutorConfig;
use crate::domain::{ExecutionError, Task, TaskId};
use crate::ports::{Clock, TaskExecutor};

const FAILURE_MESSAGES: [&str; 6] = [
    "Network timeout",
    "Database connection failed",
    "Invalid payload format",
    "Memory limit exceeded",
    "Service unavailable",
    "Authentication failed",
];

pub fn failure_message(index: usize, task_id: &TaskId) -> String {
    format!(
        "{} for task {}",
        FAILURE_MESSAGES[index % FAILURE_MESSAGES.len()],
        task_id
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Probability in `[0, 1]` that an attempt fails.
    pub failure_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,

    /// Multiplier applied to the simulated latency (0 = no sleeping).
    pub time_scale: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            failure_rate: 0.6,
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(2000),
            time_scale: 1.0,
        }
    }
}

impl From<&ExecutorConfig> for SimulationSettings {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            failure_rate: config.failure_rate,
            min_latency: Duration::from_millis(config.min_latency_ms),
            max_latency: Duration::from_millis(config.max_latency_ms),
            ..Self::default()
        }
    }
}

pub struct SimulatedExecutor {
    settings: SimulationSettings,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

/// What one simulated attempt will do, drawn up front.
struct Draw {
    latency: Duration,
    failure: Option<usize>,
}

impl SimulatedExecutor {
    pub fn new(settings: SimulationSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(settings: SimulationSettings, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self {
            settings,
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn draw(&self) -> Draw {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let min = self.settings.min_latency.as_millis() as u64;
        let max = (self.settings.max_latency.as_millis() as u64).max(min);
        let latency_ms = if max > min {
            rng.gen_range(min..max)
        } else {
            min
        };

        let failure_rate = if self.settings.failure_rate.is_nan() {
            0.0
        } else {
            self.settings.failure_rate.clamp(0.0, 1.0)
        };
        let failure = rng
            .gen_bool(failure_rate)
            .then(|| rng.gen_range(0..FAILURE_MESSAGES.len()));

        Draw {
            latency: Duration::from_millis(latency_ms),
            failure,
        }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError> {
        let draw = self.draw();

        let scaled = Duration::try_from_secs_f64(
            draw.latency.as_secs_f64() * self.settings.time_scale,
        )
        .unwrap_or(Duration::ZERO);
        if !scaled.is_zero() {
            tokio::time::sleep(scaled).await;
        }

        if let Some(index) = draw.failure {
            return Err(ExecutionError::new(failure_message(index, &task.task_id)));
        }

        Ok(json!({
            "taskId": task.task_id,
            "processedAt": self.clock.now(),
            "result": {
                "processed": true,
                "originalPayload": task.payload,
            },
        }))
    }
}
