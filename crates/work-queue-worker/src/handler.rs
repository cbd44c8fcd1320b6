//! Executors registered by the `wq-worker` binary

use crate::executor::TaskExecutor;
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use work_queue_core::{Task, TaskPayload};

/// Returns the payload unchanged
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload> {
        Ok(task.payload().to_vec())
    }
}

/// Simulates work by sleeping, then echoes the payload
pub struct SleepExecutor {
    duration: Duration,
}

impl SleepExecutor {
    pub fn new(duration: Duration) -> Self {
        SleepExecutor { duration }
    }
}

#[async_trait]
impl TaskExecutor for SleepExecutor {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload> {
        tokio::time::sleep(self.duration).await;
        Ok(task.payload().to_vec())
    }
}

/// Parses a JSON payload and answers with a small summary of it
pub struct JsonSummaryExecutor;

#[async_trait]
impl TaskExecutor for JsonSummaryExecutor {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskPayload> {
        let json: serde_json::Value =
            serde_json::from_slice(task.payload()).context("Invalid JSON")?;

        let summary = if let Some(obj) = json.as_object() {
            serde_json::json!({
                "key_count": obj.len(),
                "original": json,
            })
        } else {
            serde_json::json!({
                "original": json,
            })
        };

        Ok(serde_json::to_vec(&summary)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_executor() {
        let task = Task::new("echo", b"test data".to_vec()).unwrap();
        let output = EchoExecutor.execute(&task).await.unwrap();
        assert_eq!(output, b"test data");
    }

    #[tokio::test]
    async fn test_json_summary_counts_keys() {
        let task = Task::new("json_summary", br#"{"a": 1, "b": [2, 3]}"#.to_vec()).unwrap();
        let output = JsonSummaryExecutor.execute(&task).await.unwrap();

        let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(summary["key_count"], 2);
        assert_eq!(summary["original"]["b"][1], 3);
    }

    #[tokio::test]
    async fn test_json_summary_rejects_garbage() {
        let task = Task::new("json_summary", b"not json".to_vec()).unwrap();
        let err = JsonSummaryExecutor.execute(&task).await.unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
