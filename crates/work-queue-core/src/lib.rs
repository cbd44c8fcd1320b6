mod envelope;
mod error;
mod result;
mod task;
mod transport;

pub use envelope::{CorrelationId, Envelope};
pub use error::{Result, TaskError, TransportError, TransportResult};
pub use result::{FailureInfo, FailureKind, Outcome, TaskResult};
pub use task::{Task, TaskDefinition, TaskId, TaskPayload, TaskType};
pub use transport::MessageBroker;

pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Largest executor output that still fits in a reply
pub const MAX_OUTPUT_SIZE: usize = MAX_PAYLOAD_SIZE;
