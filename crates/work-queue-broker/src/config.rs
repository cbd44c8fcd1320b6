use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub network: NetworkConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub prometheus_port: u16,
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            network: NetworkConfig {
                host: "0.0.0.0".to_string(),
                port: 5673,
            },
            monitoring: MonitoringConfig {
                prometheus_port: 9091,
                log_level: "info".to_string(),
            },
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network:\n  host: 127.0.0.1\n  port: 7000\nmonitoring:\n  prometheus_port: 9100\n  log_level: debug"
        )
        .unwrap();

        let config = BrokerConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.monitoring.prometheus_port, 9100);
        assert_eq!(config.monitoring.log_level, "debug");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(BrokerConfig::from_file("/nonexistent/broker.yaml").is_err());
    }
}
