//! Port 実装（in-memory adapters とデモ用 executor）

pub mod event_sink;
pub mod executor;
pub mod inmem_delivery;
pub mod inmem_store;

pub use self::event_sink::{MemoryEventSink, TracingEventSink};
pub use self::executor::{SimulatedExecutor, SimulationSettings};
pub use self::inmem_delivery::{DEFAULT_HISTORY_LIMIT, InMemoryQueueTransport, SentMessage};
pub use self::inmem_store::InMemoryTaskStore;
