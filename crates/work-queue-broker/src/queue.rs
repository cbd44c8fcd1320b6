use crate::metrics::BrokerMetrics;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use work_queue_core::{Envelope, MessageBroker, TransportError, TransportResult};

/// Prefix of generated reply queue names
pub const REPLY_QUEUE_PREFIX: &str = "reply.";

/// A FIFO queue with a wakeup signal for blocked consumers
struct NamedQueue {
    messages: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    exclusive: bool,
    deleted: AtomicBool,
}

impl NamedQueue {
    fn new(exclusive: bool) -> Self {
        NamedQueue {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            exclusive,
            deleted: AtomicBool::new(false),
        }
    }

    fn push(&self, envelope: Envelope) -> usize {
        let mut messages = self.messages.lock();
        messages.push_back(envelope);
        messages.len()
    }

    fn push_front(&self, envelope: Envelope) -> usize {
        let mut messages = self.messages.lock();
        messages.push_front(envelope);
        messages.len()
    }

    fn pop(&self) -> Option<(Envelope, usize)> {
        let mut messages = self.messages.lock();
        messages.pop_front().map(|envelope| (envelope, messages.len()))
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

/// In-process broker with named FIFO queues.
///
/// Each envelope goes to exactly one consumer. Publishing to a queue that
/// does not exist drops the envelope, the way an AMQP default exchange drops
/// messages routed to a missing queue.
pub struct InMemoryBroker {
    queues: DashMap<String, Arc<NamedQueue>>,
    metrics: Arc<BrokerMetrics>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(BrokerMetrics::default()))
    }

    pub fn with_metrics(metrics: Arc<BrokerMetrics>) -> Self {
        InMemoryBroker {
            queues: DashMap::new(),
            metrics,
        }
    }

    /// Get metrics registry
    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    /// Number of envelopes waiting in a queue, `None` if it does not exist
    pub fn depth(&self, queue: &str) -> Option<usize> {
        self.lookup(queue).map(|named| named.messages.lock().len())
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }

    /// Names of all declared queues
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Put an envelope that could not be handed over back at the head of its
    /// queue. Dropped if the queue is gone.
    pub fn requeue_front(&self, queue: &str, envelope: Envelope) {
        match self.lookup(queue) {
            Some(named) if !named.is_deleted() => {
                let depth = named.push_front(envelope);
                named.notify.notify_one();

                self.metrics.inc_envelopes("requeued");
                self.record_depth(queue, &named, depth);
            }
            _ => {
                debug!("Dropping requeued envelope for missing queue {}", queue);
                self.metrics.inc_envelopes("dropped");
            }
        }
    }

    // The Arc is cloned out so no map guard is held across an await
    fn lookup(&self, queue: &str) -> Option<Arc<NamedQueue>> {
        self.queues.get(queue).map(|entry| entry.value().clone())
    }

    fn record_depth(&self, queue: &str, named: &NamedQueue, depth: usize) {
        if !named.exclusive {
            self.metrics.set_queue_depth(queue, depth);
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> TransportResult<()> {
        if self.queues.contains_key(queue) {
            return Ok(());
        }

        let mut created = false;
        self.queues.entry(queue.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(NamedQueue::new(false))
        });

        if created {
            self.metrics.queues_declared.inc();
            self.metrics.set_queue_depth(queue, 0);
            debug!("Declared queue {}", queue);
        }
        Ok(())
    }

    async fn declare_reply_queue(&self) -> TransportResult<String> {
        let name = format!("{}{}", REPLY_QUEUE_PREFIX, Uuid::new_v4());
        self.queues
            .insert(name.clone(), Arc::new(NamedQueue::new(true)));
        self.metrics.queues_declared.inc();

        debug!("Declared reply queue {}", name);
        Ok(name)
    }

    async fn delete_queue(&self, queue: &str) -> TransportResult<()> {
        if let Some((_, named)) = self.queues.remove(queue) {
            named.deleted.store(true, Ordering::Release);
            named.notify.notify_waiters();

            self.metrics.queues_declared.dec();
            if !named.exclusive {
                self.metrics.forget_queue(queue);
            }

            let discarded = named.messages.lock().len();
            debug!("Deleted queue {} ({} envelopes discarded)", queue, discarded);
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: Envelope) -> TransportResult<()> {
        match self.lookup(queue) {
            Some(named) if !named.is_deleted() => {
                let depth = named.push(envelope);
                named.notify.notify_one();

                self.metrics.inc_envelopes("published");
                self.record_depth(queue, &named, depth);
            }
            _ => {
                debug!("Dropping envelope for missing queue {}", queue);
                self.metrics.inc_envelopes("dropped");
            }
        }
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> TransportResult<Option<Envelope>> {
        let named = self
            .lookup(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        // A timeout past the representable range waits forever
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            // Registered before the emptiness check so a publish in between
            // still wakes this consumer
            let notified = named.notify.notified();

            if named.is_deleted() {
                return Err(TransportError::QueueDeleted(queue.to_string()));
            }

            if let Some((envelope, depth)) = named.pop() {
                self.metrics.inc_envelopes("delivered");
                self.record_depth(queue, &named, depth);
                return Ok(Some(envelope));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }
}
