use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer, StreamConsumer},
    message::{Header, Headers, Message, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{KafkaConfig, Protocol};
use crate::error::RelayError;
use super::envelope::{Frame, InboundMessage, CORRELATION_KEY};
use super::publisher::{MessageHandler, MessagePublisher, Transport};

// ============================================================================
// Kafka Binding
// ============================================================================
//
// Payload is the flat entity JSON; the correlation id travels as the
// `orderCorrelationId` record header. Each subscribe() owns its own
// StreamConsumer in the configured consumer group.
//
// ============================================================================

pub struct KafkaTransport {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaTransport {
    pub fn new(config: &KafkaConfig) -> Result<Self, RelayError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|e| RelayError::transport("kafka", format!("cannot create producer: {}", e)))?;

        tracing::info!(brokers = %config.brokers, "Kafka producer initialized");
        Ok(Self {
            producer,
            config: config.clone(),
        })
    }

    fn consumer(&self) -> Result<StreamConsumer, RelayError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.consumer_group)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| RelayError::transport("kafka", format!("cannot create consumer: {}", e)))
    }
}

/// Owned copy of a record, so it can cross into the handler task.
fn to_inbound<M: Message>(message: &M) -> InboundMessage {
    let frame = match message.payload() {
        Some(bytes) => Frame::Bytes(bytes.to_vec()),
        None => Frame::Unsupported("record without payload".to_string()),
    };

    let mut inbound = InboundMessage::new(message.topic(), frame);
    if let Some(headers) = message.headers() {
        for idx in 0..headers.count() {
            let header = headers.get(idx);
            if let Some(value) = header.value.and_then(|raw| std::str::from_utf8(raw).ok()) {
                inbound = inbound.with_header(header.key, value);
            }
        }
    }
    inbound
}

#[async_trait]
impl MessagePublisher for KafkaTransport {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        let headers = OwnedHeaders::new().insert(Header {
            key: CORRELATION_KEY,
            value: Some(correlation_id),
        });
        let record = FutureRecord::<(), _>::to(channel)
            .payload(payload)
            .headers(headers);

        self.producer
            .send(
                record,
                rdkafka::util::Timeout::After(Duration::from_millis(self.config.message_timeout_ms)),
            )
            .await
            .map_err(|(e, _)| RelayError::transport("kafka", format!("send to '{}' failed: {}", channel, e)))?;

        tracing::info!(
            topic = %channel,
            correlation_id = %correlation_id,
            "Published to Kafka"
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Kafka
    }

    async fn subscribe(
        &self,
        channels: &[String],
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, RelayError> {
        let consumer = self.consumer()?;
        let topics: Vec<&str> = channels.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| RelayError::transport("kafka", format!("cannot subscribe: {}", e)))?;

        tracing::info!(
            ?topics,
            group_id = %self.config.consumer_group,
            "Subscribed to Kafka topics"
        );

        let handle = tokio::spawn(async move {
            let stream = consumer.stream();
            futures_util::pin_mut!(stream);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Shutdown signal received, Kafka consumer exiting");
                            break;
                        }
                    }

                    next = stream.next() => {
                        let Some(result) = next else {
                            tracing::warn!("Kafka message stream ended unexpectedly");
                            break;
                        };
                        match result {
                            Ok(message) => {
                                let inbound = to_inbound(&message);
                                let handler = handler.clone();
                                tokio::spawn(async move { handler.on_message(inbound).await });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Kafka consumer error");
                            }
                        }
                    }
                }
            }
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::{OwnedMessage, Timestamp};

    fn record(payload: Option<&str>, headers: Option<OwnedHeaders>) -> OwnedMessage {
        OwnedMessage::new(
            payload.map(|p| p.as_bytes().to_vec()),
            None,
            "to-be-cancelled-orders".to_string(),
            Timestamp::NotAvailable,
            0,
            42,
            headers,
        )
    }

    #[test]
    fn test_record_headers_become_metadata() {
        let headers = OwnedHeaders::new()
            .insert(Header { key: CORRELATION_KEY, value: Some("corr-9") })
            .insert(Header { key: "binary", value: Some(&[0xffu8, 0xfe][..]) });

        let inbound = to_inbound(&record(Some(r#"{"id":9}"#), Some(headers)));
        assert_eq!(inbound.channel, "to-be-cancelled-orders");
        assert_eq!(inbound.frame, Frame::Bytes(br#"{"id":9}"#.to_vec()));
        assert_eq!(inbound.correlation_header(), Some("corr-9"));
        // Non UTF-8 header values are skipped
        assert!(!inbound.headers.contains_key("binary"));
    }

    #[test]
    fn test_record_without_payload_is_unsupported() {
        let inbound = to_inbound(&record(None, None));
        assert!(matches!(inbound.frame, Frame::Unsupported(_)));
        assert!(inbound.headers.is_empty());
    }
}
