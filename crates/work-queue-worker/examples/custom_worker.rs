use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use work_queue_client::RemoteBroker;
use work_queue_core::{FailureInfo, Task, TaskDefinition, TaskPayload};
use work_queue_worker::{EventListener, TaskExecutor, Worker, WorkerConfig};

#[derive(Serialize, Deserialize)]
struct ProcessImage {
    url: String,
    operations: Vec<String>,
}

impl TaskDefinition for ProcessImage {
    const TASK_TYPE: &'static str = "process_image";
}

/// Custom executor for processing images
struct ImageProcessor;

#[async_trait]
impl TaskExecutor for ImageProcessor {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload> {
        let image: ProcessImage = task.decode()?;

        println!("Processing image: {}", image.url);
        println!("Operations: {:?}", image.operations);

        // Simulate image processing
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        #[derive(Serialize)]
        struct ImageResult {
            processed_url: String,
            size_kb: u64,
        }

        let result = ImageResult {
            processed_url: format!("{}/processed", image.url),
            size_kb: 256,
        };

        Ok(serde_json::to_vec(&result)?)
    }
}

/// Prints failures as they happen
struct FailurePrinter;

impl EventListener for FailurePrinter {
    fn on_task_exception(&self, task: &Task, failure: &FailureInfo) {
        eprintln!("Task {} failed: {}", task.id(), failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = WorkerConfig {
        queue: "images".to_string(),
        ..Default::default()
    };

    let broker = RemoteBroker::connect(&config.broker_address).await?;
    let mut worker = Worker::with_config(Arc::new(broker), &config).await?;
    worker.register_task_executor(ProcessImage::TASK_TYPE, ImageProcessor);
    worker.add_event_listener(Arc::new(FailurePrinter));

    println!("Starting custom worker with executors:");
    for task_type in worker.registered_task_types() {
        println!("  - {}", task_type);
    }

    let report = worker.work(10).await?;
    println!(
        "Done: {} succeeded, {} failed",
        report.succeeded, report.failed
    );

    Ok(())
}
