pub mod config;
pub mod executor;
pub mod handler;
pub mod listener;
pub mod worker;

pub use config::WorkerConfig;
pub use executor::{executor_fn, ExecutorRegistry, TaskExecutor};
pub use listener::{EventListener, ListenerSet, TracingListener};
pub use worker::{Worker, WorkReport};

use thiserror::Error;
use work_queue_core::TransportError;

/// Errors that stop [`Worker::work`]. Task failures never do.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
