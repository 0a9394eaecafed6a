//! Decision model: what to do after a failed attempt.
//!
//! `Decision` is the answer, `Decider` is the question. The orchestrator owns
//! every side effect; deciders only look at the post-increment retry count.

use std::sync::Mutex;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::backoff::BackoffPolicy;
use super::errors::ExecutionError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Reason recorded on the task when retries are exhausted.
pub const MAX_RETRIES_REASON: &str = "Max retries exceeded";

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Schedule another attempt after `delay`.
    Retry {
        retry_count: u32,
        delay: Duration,
        reason: String,
    },

    /// Give up: mark failed and hand over to the dead-letter queue.
    MarkFailed { retry_count: u32, reason: String },
}

impl Decision {
    pub fn retry_count(&self) -> u32 {
        match self {
            Decision::Retry { retry_count, .. } | Decision::MarkFailed { retry_count, .. } => {
                *retry_count
            }
        }
    }
}

/// Decides the next action for a failed attempt.
///
/// `retry_count` is the value returned by the store's atomic increment, never
/// a value read before executing.
pub trait Decider: Send + Sync {
    fn decide(&self, retry_count: u32, error: &ExecutionError) -> Decision;
}

/// Count-based decider: retry while `retry_count < max_retries`.
#[derive(Debug)]
pub struct RetryDecider {
    max_retries: u32,
    policy: BackoffPolicy,
    rng: Mutex<StdRng>,
}

impl RetryDecider {
    pub fn new(max_retries: u32, policy: BackoffPolicy) -> Self {
        Self {
            max_retries,
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic jitter, for tests and replays.
    pub fn with_seed(max_retries: u32, policy: BackoffPolicy, seed: u64) -> Self {
        Self {
            max_retries,
            policy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

impl Default for RetryDecider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, BackoffPolicy::default())
    }
}

impl Decider for RetryDecider {
    fn decide(&self, retry_count: u32, error: &ExecutionError) -> Decision {
        if retry_count >= self.max_retries {
            return Decision::MarkFailed {
                retry_count,
                reason: MAX_RETRIES_REASON.to_string(),
            };
        }

        // Poisoning does not invalidate the rng state.
        let delay = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.policy.compute_delay(retry_count, &mut *rng)
        };

        Decision::Retry {
            retry_count,
            delay,
            reason: format!(
                "Retry {}/{} after {}s: {}",
                retry_count,
                self.max_retries,
                delay.as_secs(),
                error.message()
            ),
        }
    }
}
