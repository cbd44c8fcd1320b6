use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Prometheus metrics for the broker
pub struct BrokerMetrics {
    pub registry: Registry,

    // Envelope counters by event: published, delivered, requeued, dropped
    pub envelopes_total: IntCounterVec,

    // Declared queues, reply queues included
    pub queues_declared: IntGauge,

    // Depth of named (non-reply) queues
    pub queue_depth: IntGaugeVec,

    pub connections_open: IntGauge,
}

impl BrokerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let envelopes_total = IntCounterVec::new(
            Opts::new("wq_envelopes_total", "Envelopes handled by the broker, by event"),
            &["event"],
        )?;
        registry.register(Box::new(envelopes_total.clone()))?;

        let queues_declared = IntGauge::new("wq_queues_declared", "Number of declared queues")?;
        registry.register(Box::new(queues_declared.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("wq_queue_depth", "Envelopes waiting in each named queue"),
            &["queue"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let connections_open =
            IntGauge::new("wq_connections_open", "Number of open client connections")?;
        registry.register(Box::new(connections_open.clone()))?;

        Ok(BrokerMetrics {
            registry,
            envelopes_total,
            queues_declared,
            queue_depth,
            connections_open,
        })
    }

    pub fn inc_envelopes(&self, event: &str) {
        self.envelopes_total.with_label_values(&[event]).inc();
    }

    pub fn envelopes(&self, event: &str) -> u64 {
        self.envelopes_total.with_label_values(&[event]).get()
    }

    pub fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.queue_depth.with_label_values(&[queue]).set(depth as i64);
    }

    pub fn forget_queue(&self, queue: &str) {
        let _ = self.queue_depth.remove_label_values(&[queue]);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
