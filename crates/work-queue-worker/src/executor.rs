use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use work_queue_core::{FailureInfo, FailureKind, Task, TaskPayload, TaskType, MAX_OUTPUT_SIZE};

/// Runs tasks of one type.
///
/// An `Err` is reported as an executor failure for that task only; the worker
/// keeps going. The same goes for panics.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload>;
}

/// Executor backed by an async closure, see [`executor_fn`]
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap an async closure as a [`TaskExecutor`].
///
/// The closure receives its own copy of the task.
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskPayload>> + Send,
{
    FnExecutor { f }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TaskPayload>> + Send,
{
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload> {
        (self.f)(task.clone()).await
    }
}

/// Executors by task type
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one for the type
    pub fn register<E: TaskExecutor + 'static>(&mut self, task_type: impl Into<TaskType>, executor: E) {
        self.executors.insert(task_type.into(), Arc::new(executor));
    }

    pub fn resolve(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_type).cloned()
    }

    pub fn has_executor(&self, task_type: &str) -> bool {
        self.executors.contains_key(task_type)
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Run an executor, turning errors, panics and overruns into a [`FailureInfo`]
pub(crate) async fn run_guarded(
    executor: &dyn TaskExecutor,
    task: &Task,
    limit: Option<Duration>,
) -> Result<TaskPayload, FailureInfo> {
    let guarded = AssertUnwindSafe(executor.execute(task)).catch_unwind();

    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(FailureInfo::new(
                    FailureKind::TimedOut,
                    format!("Task execution timed out after {:?}", limit),
                ))
            }
        },
        None => guarded.await,
    };

    match outcome {
        Ok(Ok(output)) if output.len() > MAX_OUTPUT_SIZE => Err(FailureInfo::new(
            FailureKind::ExecutorFailure,
            format!(
                "Result too large: {} bytes (max {})",
                output.len(),
                MAX_OUTPUT_SIZE
            ),
        )),
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(FailureInfo::new(FailureKind::ExecutorFailure, format!("{:#}", e))),
        Err(panic) => Err(FailureInfo::new(
            FailureKind::Panicked,
            format!("Executor panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoExecutor, SleepExecutor};

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(&self, _task: &Task) -> anyhow::Result<TaskPayload> {
            anyhow::bail!("disk full")
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl TaskExecutor for PanickingExecutor {
        async fn execute(&self, _task: &Task) -> anyhow::Result<TaskPayload> {
            panic!("index out of bounds")
        }
    }

    fn task(task_type: &str) -> Task {
        Task::new(task_type, b"test data".to_vec()).unwrap()
    }

    #[test]
    fn test_registry() {
        let mut registry = ExecutorRegistry::new();
        registry.register("echo", EchoExecutor);

        assert!(registry.has_executor("echo"));
        assert!(!registry.has_executor("Echo"));
        assert!(registry.resolve("unknown").is_none());
        assert_eq!(registry.task_types(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_registration_overwrites() {
        let mut registry = ExecutorRegistry::new();
        registry.register("work", FailingExecutor);
        registry.register("work", EchoExecutor);

        let executor = registry.resolve("work").unwrap();
        let output = executor.execute(&task("work")).await.unwrap();
        assert_eq!(output, b"test data");
        assert_eq!(registry.task_types().len(), 1);
    }

    #[tokio::test]
    async fn test_guarded_success() {
        let output = run_guarded(&EchoExecutor, &task("echo"), None).await.unwrap();
        assert_eq!(output, b"test data");
    }

    #[tokio::test]
    async fn test_guarded_error_is_executor_failure() {
        let failure = run_guarded(&FailingExecutor, &task("backup"), None)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::ExecutorFailure);
        assert_eq!(failure.message, "disk full");
    }

    #[tokio::test]
    async fn test_guarded_panic_is_caught() {
        let failure = run_guarded(&PanickingExecutor, &task("crash"), None)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Panicked);
        assert!(failure.message.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_guarded_oversized_output_is_executor_failure() {
        let executor = executor_fn(|_task: Task| async move {
            Ok::<_, anyhow::Error>(vec![0u8; MAX_OUTPUT_SIZE + 1])
        });

        let failure = run_guarded(&executor, &task("bulk"), None)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::ExecutorFailure);
        assert!(failure.message.contains("Result too large"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_timeout() {
        let executor = SleepExecutor::new(Duration::from_secs(2));

        let failure = run_guarded(&executor, &task("sleep"), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::TimedOut);
        assert!(failure.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_executor_fn() {
        let executor = executor_fn(|task: Task| async move {
            Ok::<_, anyhow::Error>(task.payload().to_ascii_uppercase())
        });

        let output = executor.execute(&task("shout")).await.unwrap();
        assert_eq!(output, b"TEST DATA");
    }
}
