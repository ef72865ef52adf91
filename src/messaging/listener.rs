use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ChannelConfig;
use crate::domain::order::{CancelOrderRequest, OrderProcessor, OrderRequest, OutForDelivery};
use crate::error::RelayError;
use crate::metrics::Metrics;
use super::envelope::{Decoded, EnvelopeCodec, InboundMessage};
use super::publisher::MessageHandler;

// ============================================================================
// Inbound Listener
// ============================================================================
//
// Routes every inbound message by channel to the matching processor
// operation. A failing message is logged and dropped; it never stops the
// subscription and is never redelivered by the relay.
//
//   new-orders                    ──► process_new_order
//   to-be-cancelled-orders        ──► process_cancel_order
//   retry-failed-cancelled-orders ──► process_retry_failed_cancel_order
//   out-for-delivery-orders       ──► process_order_delivery
//
// ============================================================================

pub struct InboundListener {
    processor: Arc<OrderProcessor>,
    channels: ChannelConfig,
    codec: EnvelopeCodec,
    metrics: Arc<Metrics>,
}

impl InboundListener {
    pub fn new(
        processor: Arc<OrderProcessor>,
        channels: ChannelConfig,
        codec: EnvelopeCodec,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            processor,
            channels,
            codec,
            metrics,
        }
    }

    async fn dispatch(&self, message: &InboundMessage) -> Result<(), RelayError> {
        let channel = message.channel.as_str();

        if channel == self.channels.new_orders {
            let Decoded { event, correlation_id } = self.codec.decode::<OrderRequest>(message)?;
            self.processor.process_new_order(event, &correlation_id).await?;
        } else if channel == self.channels.to_be_cancelled_orders {
            let Decoded { event, correlation_id } = self.codec.decode::<CancelOrderRequest>(message)?;
            self.processor.process_cancel_order(event, &correlation_id).await?;
        } else if channel == self.channels.retry_failed_cancelled_orders {
            let Decoded { event, correlation_id } = self.codec.decode::<CancelOrderRequest>(message)?;
            self.processor
                .process_retry_failed_cancel_order(event, &correlation_id)
                .await?;
        } else if channel == self.channels.out_for_delivery_orders {
            // Delivery events need no correlation id
            let event = self.codec.decode_event::<OutForDelivery>(message)?;
            self.processor.process_order_delivery(event);
        } else {
            return Err(RelayError::decode(channel, "no handler bound to this channel"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for InboundListener {
    async fn on_message(&self, message: InboundMessage) {
        let started = Instant::now();

        if let Err(e) = self.dispatch(&message).await {
            tracing::error!(
                error = %e,
                channel = %message.channel,
                reason = e.kind(),
                "Dropping inbound message"
            );
            self.metrics.record_dropped(&message.channel, e.kind());
        }

        self.metrics
            .record_received(&message.channel, started.elapsed().as_secs_f64());
    }
}
