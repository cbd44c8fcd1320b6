use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use work_queue_client::RemoteBroker;
use work_queue_worker::handler::{EchoExecutor, JsonSummaryExecutor, SleepExecutor};
use work_queue_worker::{TracingListener, Worker, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "wq-worker")]
#[command(about = "Work Queue Worker", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short, long)]
    broker: Option<String>,

    /// Queue to consume from
    #[arg(short, long)]
    queue: Option<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Process this many tasks and exit (runs until interrupted if omitted)
    #[arg(short, long)]
    tasks: Option<usize>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if let Some(broker) = args.broker {
        config.broker_address = broker;
    }
    if let Some(queue) = args.queue {
        config.queue = queue;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    let broker = RemoteBroker::connect(&config.broker_address).await?;
    tracing::info!("Connected to broker at {}", config.broker_address);

    let mut worker = Worker::with_config(Arc::new(broker), &config).await?;

    // Register built-in executors
    worker.register_task_executor("echo", EchoExecutor);
    worker.register_task_executor("sleep", SleepExecutor::new(Duration::from_secs(1)));
    worker.register_task_executor("json_summary", JsonSummaryExecutor);
    worker.add_event_listener(Arc::new(TracingListener));

    tracing::info!(
        "Worker {} registered task types: {:?}",
        worker.worker_id(),
        worker.registered_task_types()
    );

    tokio::select! {
        result = run(&worker, args.tasks, config.tasks_per_run) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn run(worker: &Worker, tasks: Option<usize>, batch: usize) -> anyhow::Result<()> {
    if let Some(n) = tasks {
        let report = worker.work(n).await?;
        tracing::info!(
            "Processed {} task(s): {} succeeded, {} failed",
            report.processed,
            report.succeeded,
            report.failed
        );
        return Ok(());
    }

    loop {
        let report = worker.work(batch.max(1)).await?;
        tracing::debug!("Batch done: {:?}", report);
    }
}
