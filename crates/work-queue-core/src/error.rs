use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Payload size exceeds maximum allowed size of {max} bytes (got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("JSON payload error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Task type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Failures of the messaging substrate underneath dispatchers and workers.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue deleted while waiting: {0}")]
    QueueDeleted(String),

    #[error("Broker rejected request: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
