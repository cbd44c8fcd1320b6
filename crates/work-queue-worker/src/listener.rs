use std::sync::Arc;
use tracing::{info, warn};
use work_queue_core::{FailureInfo, Task};

/// Observer of task execution on a worker.
///
/// Hooks run synchronously on the worker's loop, so they should be quick.
/// They cannot influence the outcome of a task.
pub trait EventListener: Send + Sync {
    /// Called after an executor was found, right before it runs
    fn before_task_execution(&self, _task: &Task) {}

    fn on_task_success(&self, _task: &Task, _output: &[u8]) {}

    /// Called when the executor fails or no executor is registered
    fn on_task_exception(&self, _task: &Task, _failure: &FailureInfo) {}
}

/// Listeners in registration order
#[derive(Default, Clone)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn before_task_execution(&self, task: &Task) {
        for listener in &self.listeners {
            listener.before_task_execution(task);
        }
    }

    pub fn on_task_success(&self, task: &Task, output: &[u8]) {
        for listener in &self.listeners {
            listener.on_task_success(task, output);
        }
    }

    pub fn on_task_exception(&self, task: &Task, failure: &FailureInfo) {
        for listener in &self.listeners {
            listener.on_task_exception(task, failure);
        }
    }
}

/// Logs task lifecycle events
pub struct TracingListener;

impl EventListener for TracingListener {
    fn before_task_execution(&self, task: &Task) {
        info!("Starting task {} (type: {})", task.id(), task.task_type());
    }

    fn on_task_success(&self, task: &Task, output: &[u8]) {
        info!(
            "Task {} (type: {}) succeeded with {} bytes of output",
            task.id(),
            task.task_type(),
            output.len()
        );
    }

    fn on_task_exception(&self, task: &Task, failure: &FailureInfo) {
        warn!(
            "Task {} (type: {}) failed: {}",
            task.id(),
            task.task_type(),
            failure
        );
    }
}
