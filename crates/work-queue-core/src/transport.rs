use crate::{Envelope, TransportResult};
use async_trait::async_trait;
use std::time::Duration;

/// Minimal messaging substrate the dispatch protocol is built on.
///
/// Implementations must deliver each published envelope to at most one
/// consumer of the queue. A received envelope is removed from the queue;
/// nothing is requeued when its task later fails.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Create a named queue; declaring an existing queue is a no-op
    async fn declare_queue(&self, queue: &str) -> TransportResult<()>;

    /// Create an exclusive, uniquely named queue for replies and return its name
    async fn declare_reply_queue(&self) -> TransportResult<String>;

    /// Remove a queue and everything still in it; unknown queues are ignored
    async fn delete_queue(&self, queue: &str) -> TransportResult<()>;

    /// Append an envelope to a queue.
    ///
    /// Publishing to a queue that does not exist (for example a reply queue
    /// already deleted by a dispatcher that timed out) drops the envelope.
    async fn publish(&self, queue: &str, envelope: Envelope) -> TransportResult<()>;

    /// Take the next envelope, waiting up to `timeout` (forever when `None`).
    ///
    /// Returns `Ok(None)` once the timeout has elapsed with nothing to deliver.
    async fn receive(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> TransportResult<Option<Envelope>>;
}
