use crate::{Result, Task, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token linking a dispatched task to the result published for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Broker message carrying an encoded task or result plus routing metadata.
///
/// Request envelopes hold a [`Task`]; a `reply_to` queue and a correlation id
/// are present only when the dispatcher waits for the outcome. Reply
/// envelopes hold a [`TaskResult`] and echo the request's correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    correlation_id: Option<CorrelationId>,
    reply_to: Option<String>,
    body: Vec<u8>,
    published_at: DateTime<Utc>,
}

impl Envelope {
    /// Fire-and-forget request
    pub fn for_task(task: &Task) -> Result<Self> {
        Ok(Envelope {
            correlation_id: None,
            reply_to: None,
            body: task.to_bytes()?,
            published_at: Utc::now(),
        })
    }

    /// Request whose result must be published to `reply_to`
    pub fn for_task_with_reply(
        task: &Task,
        correlation_id: CorrelationId,
        reply_to: impl Into<String>,
    ) -> Result<Self> {
        Ok(Envelope {
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to.into()),
            body: task.to_bytes()?,
            published_at: Utc::now(),
        })
    }

    /// Reply to a request carrying `correlation_id`
    pub fn for_result(result: &TaskResult, correlation_id: Option<CorrelationId>) -> Result<Self> {
        Ok(Envelope {
            correlation_id,
            reply_to: None,
            body: result.to_bytes()?,
            published_at: Utc::now(),
        })
    }

    /// Raw envelope, mostly useful to feed malformed bodies into tests
    pub fn from_parts(
        correlation_id: Option<CorrelationId>,
        reply_to: Option<String>,
        body: Vec<u8>,
    ) -> Self {
        Envelope {
            correlation_id,
            reply_to,
            body,
            published_at: Utc::now(),
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// True when this envelope answers the request tagged `correlation_id`
    pub fn matches(&self, correlation_id: &CorrelationId) -> bool {
        self.correlation_id.as_ref() == Some(correlation_id)
    }

    pub fn decode_task(&self) -> Result<Task> {
        Task::from_bytes(&self.body)
    }

    pub fn decode_result(&self) -> Result<TaskResult> {
        TaskResult::from_bytes(&self.body)
    }
}
