mod blocking;
mod dispatcher;
mod remote;

pub use blocking::BlockingDispatcher;
pub use dispatcher::WorkDispatcher;
pub use remote::RemoteBroker;

use std::time::Duration;
use thiserror::Error;
use work_queue_core::{TaskError, TransportError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No result within {0:?}")]
    Timeout(Duration),

    #[error("Task encoding error: {0}")]
    Task(#[from] TaskError),

    #[error("Runtime error: {0}")]
    Runtime(std::io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
