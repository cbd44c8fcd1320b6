use crate::{DispatchError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use work_queue_core::{CorrelationId, Envelope, MessageBroker, Task, TaskResult};

/// How a dispatch-and-wait call ended
enum WaitOutcome {
    Completed(TaskResult),
    TimedOut,
}

/// Publishes tasks to a work queue and optionally waits for their results.
///
/// Every waiting call owns a private reply queue and a fresh correlation id;
/// nothing is shared between calls. The reply queue is deleted when the call
/// returns, whichever way it ends. Broker failures are returned as they
/// happen and never retried here.
pub struct WorkDispatcher {
    broker: Arc<dyn MessageBroker>,
    queue: String,
}

impl WorkDispatcher {
    /// Create a dispatcher for `queue`, declaring it on the broker
    pub async fn new(broker: Arc<dyn MessageBroker>, queue: impl Into<String>) -> Result<Self> {
        let queue = queue.into();
        broker.declare_queue(&queue).await?;

        Ok(WorkDispatcher { broker, queue })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Queue a task for execution and return without waiting
    pub async fn run_background(&self, task: Task) -> Result<()> {
        let envelope = Envelope::for_task(&task)?;
        self.broker.publish(&self.queue, envelope).await?;

        info!(
            "Dispatched task {} (type: {}) to {}",
            task.id(),
            task.task_type(),
            self.queue
        );
        Ok(())
    }

    /// Queue a task and wait up to `timeout` for its result.
    ///
    /// Exactly one of the callbacks runs: `on_completed` with the result if a
    /// matching reply arrives in time, `on_timeout` otherwise. A timeout is not
    /// an error here; only broker failures are.
    pub async fn run_background_with_callbacks<C, T>(
        &self,
        task: Task,
        timeout: Duration,
        on_completed: C,
        on_timeout: T,
    ) -> Result<()>
    where
        C: FnOnce(TaskResult),
        T: FnOnce(),
    {
        match self.dispatch_and_wait(task, timeout).await? {
            WaitOutcome::Completed(result) => on_completed(result),
            WaitOutcome::TimedOut => on_timeout(),
        }
        Ok(())
    }

    /// Queue a task and wait up to `timeout` for its result.
    ///
    /// A failed task is still a returned [`TaskResult`]; only a missing reply
    /// is [`DispatchError::Timeout`].
    pub async fn run_and_wait(&self, task: Task, timeout: Duration) -> Result<TaskResult> {
        match self.dispatch_and_wait(task, timeout).await? {
            WaitOutcome::Completed(result) => Ok(result),
            WaitOutcome::TimedOut => Err(DispatchError::Timeout(timeout)),
        }
    }

    async fn dispatch_and_wait(&self, task: Task, timeout: Duration) -> Result<WaitOutcome> {
        let correlation_id = CorrelationId::new();
        let reply_queue = self.broker.declare_reply_queue().await?;

        let outcome = self
            .publish_and_wait(&task, correlation_id, &reply_queue, timeout)
            .await;

        // Anything still in the queue (a reply that lost the race) goes with it
        if let Err(e) = self.broker.delete_queue(&reply_queue).await {
            warn!("Failed to delete reply queue {}: {}", reply_queue, e);
        }

        outcome
    }

    async fn publish_and_wait(
        &self,
        task: &Task,
        correlation_id: CorrelationId,
        reply_queue: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        let envelope = Envelope::for_task_with_reply(task, correlation_id, reply_queue)?;
        self.broker.publish(&self.queue, envelope).await?;

        debug!(
            "Dispatched task {} (type: {}), waiting up to {:?} on {}",
            task.id(),
            task.task_type(),
            timeout,
            reply_queue
        );

        // No deadline when the timeout is too large to represent
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    Some(remaining)
                }
                None => None,
            };

            match self.broker.receive(reply_queue, remaining).await? {
                Some(reply) if reply.matches(&correlation_id) => {
                    let result = reply.decode_result()?;
                    debug!("Task {} completed (success: {})", task.id(), result.is_success());
                    return Ok(WaitOutcome::Completed(result));
                }
                Some(reply) => {
                    debug!(
                        "Discarding reply with unexpected correlation id {:?} on {}",
                        reply.correlation_id(),
                        reply_queue
                    );
                }
                None => break,
            }
        }

        info!("Task {} timed out after {:?}", task.id(), timeout);
        Ok(WaitOutcome::TimedOut)
    }
}
