//! Batch handler contract shared by the orchestrator and the monitor.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{Delivery, ReboundError};

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Completed,
    RetryScheduled,

    /// Marked failed and dead-letter message published.
    Failed,

    /// Finalized as dead letter by the monitor.
    Quarantined,

    /// Task already past this step; nothing changed.
    Duplicate,

    /// Failed task found again; dead-letter message published again.
    Republished,

    /// Message could not be acted on (bad body, unknown task, ...).
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub duplicates: usize,
    pub republished: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Completed => self.completed += 1,
            MessageOutcome::RetryScheduled => self.retried += 1,
            MessageOutcome::Failed => self.failed += 1,
            MessageOutcome::Quarantined => self.quarantined += 1,
            MessageOutcome::Duplicate => self.duplicates += 1,
            MessageOutcome::Republished => self.republished += 1,
            MessageOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.received += other.received;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.quarantined += other.quarantined;
        self.duplicates += other.duplicates;
        self.republished += other.republished;
        self.skipped += other.skipped;
    }
}

/// Processes one batch of deliveries from a queue.
///
/// Messages in a batch are handled one after another. `Err` means the whole
/// batch should be handed back to the transport.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, batch: &[Delivery]) -> Result<BatchReport, ReboundError>;
}
