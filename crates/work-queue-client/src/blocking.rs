use crate::{DispatchError, RemoteBroker, Result, WorkDispatcher};
use std::sync::Arc;
use std::time::Duration;
use work_queue_core::{MessageBroker, Task, TaskResult};

/// Synchronous dispatcher (wraps [`WorkDispatcher`] in its own runtime)
pub struct BlockingDispatcher {
    runtime: tokio::runtime::Runtime,
    dispatcher: WorkDispatcher,
}

impl BlockingDispatcher {
    /// Connect to a broker and declare `queue`
    pub fn connect(broker_address: impl Into<String>, queue: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new().map_err(DispatchError::Runtime)?;
        let broker_address = broker_address.into();

        let dispatcher = runtime.block_on(async {
            let broker = RemoteBroker::connect(broker_address).await?;
            WorkDispatcher::new(Arc::new(broker), queue).await
        })?;

        Ok(BlockingDispatcher {
            runtime,
            dispatcher,
        })
    }

    /// Use an existing broker handle
    pub fn with_broker(broker: Arc<dyn MessageBroker>, queue: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new().map_err(DispatchError::Runtime)?;
        let dispatcher = runtime.block_on(WorkDispatcher::new(broker, queue))?;

        Ok(BlockingDispatcher {
            runtime,
            dispatcher,
        })
    }

    pub fn queue(&self) -> &str {
        self.dispatcher.queue()
    }

    pub fn run_background(&self, task: Task) -> Result<()> {
        self.runtime.block_on(self.dispatcher.run_background(task))
    }

    pub fn run_background_with_callbacks<C, T>(
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
        self.runtime.block_on(self.dispatcher.run_background_with_callbacks(
            task,
            timeout,
            on_completed,
            on_timeout,
        ))
    }

    pub fn run_and_wait(&self, task: Task, timeout: Duration) -> Result<TaskResult> {
        self.runtime
            .block_on(self.dispatcher.run_and_wait(task, timeout))
    }
}
