use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::RelayError;
use crate::messaging::{CorrelationPrecedence, MissingCorrelation, WireFormat};
use crate::retry::PolicyKind;

// ============================================================================
// Configuration
// ============================================================================
//
// Load order (later sources override earlier ones):
// 1. built-in defaults (Default impls below)
// 2. $CONFIG_DIR/default.toml
// 3. $CONFIG_DIR/$RELAY_ENV.toml
// 4. RELAY__* environment variables (RELAY__RECEIVE__PROTOCOL -> receive.protocol)
//
// ============================================================================

/// Messaging technologies a binding exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Kafka,
    Redis,
    Memory,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Kafka => "kafka",
            Protocol::Redis => "redis",
            Protocol::Memory => "memory",
        }
    }

    /// Envelope shape the technology uses when nothing is configured.
    /// Redis pub/sub has no message metadata, so the correlation id travels
    /// inside the wrapper.
    pub fn default_wire_format(&self) -> WireFormat {
        match self {
            Protocol::Redis => WireFormat::Wrapped,
            Protocol::Kafka | Protocol::Memory => WireFormat::Flat,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    pub protocol: Protocol,
    /// Falls back to the protocol's default shape when unset.
    pub envelope: Option<WireFormat>,
    pub correlation_precedence: CorrelationPrecedence,
    pub missing_correlation: MissingCorrelation,
    /// Whether the inbound binding also serves as the RetryMessagePublisher.
    pub retry_publisher: bool,
}

impl ReceiveConfig {
    pub fn wire_format(&self) -> WireFormat {
        self.envelope
            .unwrap_or_else(|| self.protocol.default_wire_format())
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Kafka,
            envelope: None,
            correlation_precedence: CorrelationPrecedence::HeaderFirst,
            missing_correlation: MissingCorrelation::Reject,
            retry_publisher: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub protocol: Protocol,
    /// Correlation id stamped on accepted-orders events when the caller gives none.
    pub accepted_correlation_id: String,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Kafka,
            accepted_correlation_id: "12345".to_string(),
        }
    }
}

/// Physical names of the logical channels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub new_orders: String,
    pub to_be_cancelled_orders: String,
    pub retry_failed_cancelled_orders: String,
    pub out_for_delivery_orders: String,
    pub wip_orders: String,
    pub cancelled_orders: String,
    pub accepted_orders: String,
}

impl ChannelConfig {
    pub fn inbound(&self) -> Vec<String> {
        vec![
            self.new_orders.clone(),
            self.to_be_cancelled_orders.clone(),
            self.retry_failed_cancelled_orders.clone(),
            self.out_for_delivery_orders.clone(),
        ]
    }

    fn all(&self) -> [(&'static str, &str); 7] {
        [
            ("new_orders", &self.new_orders),
            ("to_be_cancelled_orders", &self.to_be_cancelled_orders),
            ("retry_failed_cancelled_orders", &self.retry_failed_cancelled_orders),
            ("out_for_delivery_orders", &self.out_for_delivery_orders),
            ("wip_orders", &self.wip_orders),
            ("cancelled_orders", &self.cancelled_orders),
            ("accepted_orders", &self.accepted_orders),
        ]
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            new_orders: "new-orders".to_string(),
            to_be_cancelled_orders: "to-be-cancelled-orders".to_string(),
            retry_failed_cancelled_orders: "retry-failed-cancelled-orders".to_string(),
            out_for_delivery_orders: "out-for-delivery-orders".to_string(),
            wip_orders: "wip-orders".to_string(),
            cancelled_orders: "cancelled-orders".to_string(),
            accepted_orders: "accepted-orders".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CancelRetryConfig {
    pub enabled: bool,
    /// Order id that diverts a cancellation into the retry scheduler.
    pub sentinel_order_id: i64,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    /// Added to every delay so the downstream subscriber is already listening.
    pub buffer_ms: u64,
    pub policy: PolicyKind,
    pub timer_threads: usize,
}

impl CancelRetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn buffer(&self) -> Duration {
        Duration::from_millis(self.buffer_ms)
    }
}

impl Default for CancelRetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sentinel_order_id: 999,
            max_attempts: 3,
            initial_delay_ms: 5_000,
            multiplier: 2.0,
            buffer_ms: 2_000,
            policy: PolicyKind::SuppressUntilFinal,
            timer_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryConfig {
    pub cancel_order: CancelRetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub auto_offset_reset: String,
    pub message_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".to_string(),
            consumer_group: "order-relay".to_string(),
            auto_offset_reset: "earliest".to_string(),
            message_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_seconds: 30,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "json" for structured output, anything else for human-readable lines
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info,order_relay=debug".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub receive: ReceiveConfig,
    pub send: SendConfig,
    pub channels: ChannelConfig,
    pub retry: RetryConfig,
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load from files and environment, then validate.
    pub fn load() -> Result<Self, RelayError> {
        let env = std::env::var("RELAY_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let config: Self = Config::builder()
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RelayError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let retry = &self.retry.cancel_order;
        if retry.max_attempts < 1 {
            return Err(RelayError::Config(
                "retry.cancel_order.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(retry.multiplier > 0.0) {
            return Err(RelayError::Config(format!(
                "retry.cancel_order.multiplier must be positive, got {}",
                retry.multiplier
            )));
        }
        if retry.timer_threads < 2 {
            return Err(RelayError::Config(format!(
                "retry.cancel_order.timer_threads must be at least 2, got {}",
                retry.timer_threads
            )));
        }
        for (key, name) in self.channels.all() {
            if name.trim().is_empty() {
                return Err(RelayError::Config(format!("channels.{} is empty", key)));
            }
        }
        Ok(())
    }
}
