use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker_address: String,
    pub queue: String,
    pub worker_id: Option<String>,
    /// Per-task execution limit in seconds, 0 disables it
    pub execution_timeout_secs: u64,
    /// Tasks handled per `work` call when running continuously
    pub tasks_per_run: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker_address: "127.0.0.1:5673".to_string(),
            queue: "tasks".to_string(),
            worker_id: None,
            execution_timeout_secs: 300,
            tasks_per_run: 100,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        (self.execution_timeout_secs > 0).then(|| Duration::from_secs(self.execution_timeout_secs))
    }

    /// Configured worker id, or a generated one
    pub fn generate_worker_id(&self) -> String {
        match &self.worker_id {
            Some(id) => id.clone(),
            None => generate_worker_id(),
        }
    }
}

/// `<hostname>-<pid>-<random>`
pub fn generate_worker_id() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let pid = std::process::id();
    let random = uuid::Uuid::new_v4().simple().to_string();

    format!("{}-{}-{}", hostname, pid, &random[..8])
}
