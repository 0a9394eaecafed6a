//! Observability: tracing subscriber setup and status counts.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::domain::TaskStatus;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level`. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub failed: usize,
    pub dead_letter: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::RetryScheduled => self.retry_scheduled += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::DeadLetter => self.dead_letter += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending
            + self.processing
            + self.completed
            + self.retry_scheduled
            + self.failed
            + self.dead_letter
    }

    /// Tasks that will never change again.
    pub fn terminal(&self) -> usize {
        self.completed + self.dead_letter
    }
}
