use crate::{Result, TaskError, TaskPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a task did not complete successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The executor returned an error
    ExecutorFailure,
    /// No executor is registered for the task type
    NoExecutorRegistered,
    /// The executor panicked
    Panicked,
    /// The executor exceeded the worker's execution timeout
    TimedOut,
    /// The envelope body could not be decoded into a task
    InvalidTask,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExecutorFailure => "executor_failure",
            FailureKind::NoExecutorRegistered => "no_executor_registered",
            FailureKind::Panicked => "panicked",
            FailureKind::TimedOut => "timed_out",
            FailureKind::InvalidTask => "invalid_task",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enough information to report a failure on the other side of the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureInfo {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        FailureInfo {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FailureInfo {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success { output: TaskPayload },
    Failure(FailureInfo),
}

/// Result of one task execution, sent back to a waiting dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub outcome: Outcome,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(output: TaskPayload) -> Self {
        TaskResult {
            outcome: Outcome::Success { output },
            completed_at: Utc::now(),
        }
    }

    pub fn failure(failure: FailureInfo) -> Self {
        TaskResult {
            outcome: Outcome::Failure(failure),
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Output payload when the task succeeded
    pub fn output(&self) -> Option<&[u8]> {
        match &self.outcome {
            Outcome::Success { output } => Some(output),
            Outcome::Failure(_) => None,
        }
    }

    /// Failure details when the task failed
    pub fn failure_info(&self) -> Option<&FailureInfo> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure(info) => Some(info),
        }
    }

    pub fn into_output(self) -> std::result::Result<TaskPayload, FailureInfo> {
        match self.outcome {
            Outcome::Success { output } => Ok(output),
            Outcome::Failure(info) => Err(info),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }
}
