use crate::config::{self, WorkerConfig};
use crate::executor::{run_guarded, ExecutorRegistry, TaskExecutor};
use crate::listener::{EventListener, ListenerSet};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use work_queue_core::{
    CorrelationId, Envelope, FailureInfo, FailureKind, MessageBroker, Task, TaskResult, TaskType,
};

/// Counts for one [`Worker::work`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl WorkReport {
    fn record(&mut self, result: &TaskResult) {
        self.processed += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Consumes tasks from one queue and runs them, one at a time.
///
/// Executors and listeners are set up through `&mut self` before calling
/// [`work`](Worker::work), which only needs `&self`.
pub struct Worker {
    broker: Arc<dyn MessageBroker>,
    queue: String,
    worker_id: String,
    executors: ExecutorRegistry,
    listeners: ListenerSet,
    execution_timeout: Option<Duration>,
}

impl Worker {
    /// Create a worker for `queue`, declaring it on the broker
    pub async fn new(broker: Arc<dyn MessageBroker>, queue: impl Into<String>) -> Result<Self> {
        let queue = queue.into();
        broker.declare_queue(&queue).await?;

        Ok(Worker {
            broker,
            queue,
            worker_id: config::generate_worker_id(),
            executors: ExecutorRegistry::new(),
            listeners: ListenerSet::new(),
            execution_timeout: None,
        })
    }

    /// Create a worker with queue, id and execution timeout taken from `config`
    pub async fn with_config(broker: Arc<dyn MessageBroker>, config: &WorkerConfig) -> Result<Self> {
        let mut worker = Self::new(broker, config.queue.clone()).await?;
        worker.worker_id = config.generate_worker_id();
        worker.execution_timeout = config.execution_timeout();
        Ok(worker)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Limit how long a single executor may run; `None` means no limit
    pub fn set_execution_timeout(&mut self, timeout: Option<Duration>) {
        self.execution_timeout = timeout;
    }

    /// Register the executor for a task type, replacing any previous one
    pub fn register_task_executor<E: TaskExecutor + 'static>(
        &mut self,
        task_type: impl Into<TaskType>,
        executor: E,
    ) {
        self.executors.register(task_type, executor);
    }

    pub fn add_event_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn registered_task_types(&self) -> Vec<String> {
        self.executors.task_types()
    }

    /// Process exactly `n` tasks, waiting for each as long as it takes.
    ///
    /// Task failures of any kind are reported to listeners and, when the
    /// dispatcher asked for it, in the reply; they never end the call. Only a
    /// broker failure does.
    pub async fn work(&self, n: usize) -> Result<WorkReport> {
        let mut report = WorkReport::default();

        if n > 0 {
            info!(
                "Worker {} processing {} task(s) from {}",
                self.worker_id, n, self.queue
            );
        }

        while report.processed < n {
            let envelope = match self.broker.receive(&self.queue, None).await? {
                Some(envelope) => envelope,
                None => continue,
            };

            let result = self.process(&envelope).await;
            report.record(&result);
            self.reply(&envelope, &result).await;
        }

        debug!("Worker {} finished run: {:?}", self.worker_id, report);
        Ok(report)
    }

    async fn process(&self, envelope: &Envelope) -> TaskResult {
        match envelope.decode_task() {
            Ok(task) => self.execute(&task).await,
            Err(e) => {
                warn!("Discarding undecodable envelope from {}: {}", self.queue, e);
                TaskResult::failure(FailureInfo::new(FailureKind::InvalidTask, e.to_string()))
            }
        }
    }

    async fn execute(&self, task: &Task) -> TaskResult {
        info!("Executing task {} (type: {})", task.id(), task.task_type());

        let executor = match self.executors.resolve(task.task_type()) {
            Some(executor) => executor,
            None => {
                error!("No executor registered for task type: {}", task.task_type());
                let failure = FailureInfo::new(
                    FailureKind::NoExecutorRegistered,
                    format!("No executor registered for task type: {}", task.task_type()),
                );
                self.listeners.on_task_exception(task, &failure);
                return TaskResult::failure(failure);
            }
        };

        self.listeners.before_task_execution(task);

        match run_guarded(executor.as_ref(), task, self.execution_timeout).await {
            Ok(output) => {
                info!("Task {} completed successfully", task.id());
                self.listeners.on_task_success(task, &output);
                TaskResult::success(output)
            }
            Err(failure) => {
                error!("Task {} failed: {}", task.id(), failure);
                self.listeners.on_task_exception(task, &failure);
                TaskResult::failure(failure)
            }
        }
    }

    /// Publish the result if the dispatcher is waiting for one
    async fn reply(&self, request: &Envelope, result: &TaskResult) {
        let reply_to = match request.reply_to() {
            Some(reply_to) => reply_to,
            None => return,
        };
        let correlation_id = request.correlation_id();

        let err = match self.publish_result(reply_to, correlation_id, result).await {
            Ok(()) => return,
            Err(e) => e,
        };
        error!("Failed to publish result to {}: {:#}", reply_to, err);

        // The dispatcher is still owed an answer
        if result.is_success() {
            let fallback = TaskResult::failure(FailureInfo::new(
                FailureKind::ExecutorFailure,
                format!("Result could not be delivered: {:#}", err),
            ));
            if let Err(e) = self.publish_result(reply_to, correlation_id, &fallback).await {
                error!("Failed to publish fallback result to {}: {:#}", reply_to, e);
            }
        }
    }

    async fn publish_result(
        &self,
        reply_to: &str,
        correlation_id: Option<CorrelationId>,
        result: &TaskResult,
    ) -> anyhow::Result<()> {
        let reply = Envelope::for_result(result, correlation_id)?;
        self.broker.publish(reply_to, reply).await?;
        Ok(())
    }
}
