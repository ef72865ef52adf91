use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Protocol, RedisConfig};
use crate::error::RelayError;
use crate::utils::{retry_with_backoff, BackoffConfig};
use super::envelope::{wrap, Frame, InboundMessage};
use super::publisher::{MessageHandler, MessagePublisher, Transport};

// ============================================================================
// Redis Pub/Sub Binding
// ============================================================================
//
// Pub/sub messages carry no metadata, so every outbound payload is wrapped as
// {"orderCorrelationId": ..., "payload": <entity>} and inbound frames are
// handed to the codec as raw bytes for unwrapping.
//
// Delivery is at-most-once: nothing published while no subscriber is
// connected is ever seen.
//
// ============================================================================

pub struct RedisTransport {
    client: Client,
    connection: MultiplexedConnection,
    backoff: BackoffConfig,
}

impl RedisTransport {
    pub async fn connect(config: &RedisConfig) -> Result<Self, RelayError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RelayError::transport("redis", format!("invalid url: {}", e)))?;
        let backoff = BackoffConfig::default();

        let connection = retry_with_backoff("redis connect", &backoff, |_| {
            let client = client.clone();
            async move { client.get_multiplexed_async_connection().await }
        })
        .await
        .map_err(|e| RelayError::transport("redis", format!("cannot connect: {}", e)))?;

        tracing::info!(url = %config.url, "Redis connection established");
        Ok(Self {
            client,
            connection,
            backoff,
        })
    }
}

#[async_trait]
impl MessagePublisher for RedisTransport {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        let body = wrap(payload, correlation_id)?;
        let mut connection = self.connection.clone();

        let receivers: i64 = connection
            .publish(channel, body)
            .await
            .map_err(|e| RelayError::transport("redis", format!("publish to '{}' failed: {}", channel, e)))?;

        tracing::info!(
            channel = %channel,
            correlation_id = %correlation_id,
            receivers,
            "Published to Redis"
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for RedisTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Redis
    }

    async fn subscribe(
        &self,
        channels: &[String],
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, RelayError> {
        let mut pubsub = retry_with_backoff("redis subscribe", &self.backoff, |_| {
            let client = self.client.clone();
            async move { client.get_async_pubsub().await }
        })
        .await
        .map_err(|e| RelayError::transport("redis", format!("cannot open pub/sub connection: {}", e)))?;

        for channel in channels {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(|e| RelayError::transport("redis", format!("cannot subscribe to '{}': {}", channel, e)))?;
        }
        tracing::info!(?channels, "Subscribed to Redis channels");

        let handle = tokio::spawn(async move {
            let stream = pubsub.into_on_message();
            futures_util::pin_mut!(stream);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Shutdown signal received, Redis subscriber exiting");
                            break;
                        }
                    }

                    next = stream.next() => {
                        let Some(message) = next else {
                            tracing::warn!("Redis pub/sub stream ended unexpectedly");
                            break;
                        };
                        let inbound = InboundMessage::new(
                            message.get_channel_name(),
                            Frame::Bytes(message.get_payload_bytes().to_vec()),
                        );
                        let handler = handler.clone();
                        tokio::spawn(async move { handler.on_message(inbound).await });
                    }
                }
            }
        });

        Ok(handle)
    }
}
