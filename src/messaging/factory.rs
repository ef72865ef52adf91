use std::sync::Arc;

use crate::config::{AppConfig, Protocol};
use crate::error::RelayError;
use super::kafka::KafkaTransport;
use super::memory::MemoryTransport;
use super::publisher::{MessagePublisher, Transport};
use super::redis::RedisTransport;

/// One messaging technology, seen both as a subscribable transport and as a
/// plain publisher.
#[derive(Clone)]
pub struct Binding {
    pub transport: Arc<dyn Transport>,
    pub publisher: Arc<dyn MessagePublisher>,
}

impl Binding {
    fn from_transport<T: Transport + 'static>(transport: Arc<T>) -> Self {
        Self {
            transport: transport.clone(),
            publisher: transport,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }
}

/// Build the binding for `protocol`. Fails fast on unreachable brokers that
/// the client connects to eagerly.
pub async fn build_binding(protocol: Protocol, config: &AppConfig) -> Result<Binding, RelayError> {
    let binding = match protocol {
        Protocol::Kafka => Binding::from_transport(Arc::new(KafkaTransport::new(&config.kafka)?)),
        Protocol::Redis => Binding::from_transport(Arc::new(RedisTransport::connect(&config.redis).await?)),
        Protocol::Memory => Binding::from_transport(Arc::new(MemoryTransport::new())),
    };

    tracing::info!(protocol = %protocol, "Messaging binding ready");
    Ok(binding)
}
