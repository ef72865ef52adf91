use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the relay
// ============================================================================
//
// Provides metrics for:
// - Inbound messages (received, dropped by reason, handling latency)
// - Outbound publishes (success/failure per channel)
// - Scheduled cancellation retries (per attempt and outcome)
// - Order lookup size
//
// Scraped via GET /metrics on the API server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Inbound
    pub messages_received: IntCounterVec,
    pub messages_dropped: IntCounterVec,
    pub handling_duration: HistogramVec,

    // Outbound
    pub publishes: IntCounterVec,
    pub publish_failures: IntCounterVec,

    // Retry scheduler
    pub retries_scheduled: IntCounter,
    pub retry_attempts: IntCounterVec,

    // Order lookup
    pub orders_stored: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_received = IntCounterVec::new(
            Opts::new("relay_messages_received_total", "Inbound messages received"),
            &["channel"],
        )?;
        registry.register(Box::new(messages_received.clone()))?;

        let messages_dropped = IntCounterVec::new(
            Opts::new("relay_messages_dropped_total", "Inbound messages dropped after a failure"),
            &["channel", "reason"],
        )?;
        registry.register(Box::new(messages_dropped.clone()))?;

        let handling_duration = HistogramVec::new(
            HistogramOpts::new("relay_handling_duration_seconds", "Inbound message handling duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["channel"],
        )?;
        registry.register(Box::new(handling_duration.clone()))?;

        let publishes = IntCounterVec::new(
            Opts::new("relay_publish_total", "Successful outbound publishes"),
            &["channel"],
        )?;
        registry.register(Box::new(publishes.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("relay_publish_failed_total", "Failed outbound publishes"),
            &["channel"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let retries_scheduled = IntCounter::new(
            "relay_retries_scheduled_total",
            "Cancellation retry batches scheduled",
        )?;
        registry.register(Box::new(retries_scheduled.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("relay_retry_attempts_total", "Scheduled retry attempts that fired"),
            &["attempt", "outcome"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let orders_stored = IntGauge::new("relay_orders_stored", "Orders held in the lookup")?;
        registry.register(Box::new(orders_stored.clone()))?;

        Ok(Self {
            registry,
            messages_received,
            messages_dropped,
            handling_duration,
            publishes,
            publish_failures,
            retries_scheduled,
            retry_attempts,
            orders_stored,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_received(&self, channel: &str, duration_secs: f64) {
        self.messages_received.with_label_values(&[channel]).inc();
        self.handling_duration.with_label_values(&[channel]).observe(duration_secs);
    }

    pub fn record_dropped(&self, channel: &str, reason: &str) {
        self.messages_dropped.with_label_values(&[channel, reason]).inc();
    }

    pub fn record_publish(&self, channel: &str, success: bool) {
        if success {
            self.publishes.with_label_values(&[channel]).inc();
        } else {
            self.publish_failures.with_label_values(&[channel]).inc();
        }
    }

    pub fn record_retry_attempt(&self, attempt: u32, outcome: &str) {
        self.retry_attempts
            .with_label_values(&[&attempt.to_string(), outcome])
            .inc();
    }

    /// Text exposition format for the /metrics endpoint.
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
