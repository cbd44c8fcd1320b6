pub mod broker;
pub mod queue;
pub mod config;
pub mod metrics;

pub use broker::BrokerServer;
pub use config::BrokerConfig;
pub use metrics::BrokerMetrics;
pub use queue::InMemoryBroker;
