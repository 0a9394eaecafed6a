//! Domain model (IDs, task record, status machine, backoff, decisions, events).
//!
//! I/O を一切持たない純粋な層。ports / impls / app はここの型だけを共有します。

pub mod backoff;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod status;
pub mod task;

pub use backoff::BackoffPolicy;
pub use decision::{DEFAULT_MAX_RETRIES, Decider, Decision, MAX_RETRIES_REASON, RetryDecider};
pub use errors::{ErrorKind, ExecutionError, ReboundError};
pub use events::{DeadLetterReport, DomainEvent, MetricRecord};
pub use ids::{MessageId, TaskId};
pub use message::{DeadLetterMessage, Delivery, QueueName, WorkMessage};
pub use status::TaskStatus;
pub use task::{DLQ_REASON, PhaseTimestamps, Task, TaskPatch};
