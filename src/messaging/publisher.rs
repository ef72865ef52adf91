use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Protocol;
use crate::error::RelayError;
use crate::utils::{CircuitBreaker, CircuitBreakerError, CircuitState};
use super::envelope::InboundMessage;

// ============================================================================
// Transport Contracts
// ============================================================================
//
// MessagePublisher       - fire-and-forget publish to a named channel
// RetryMessagePublisher  - same contract, reserved for the cancellation retry
//                          path and bound to the inbound technology
// Transport              - one per technology: publish + subscribe
// MessageHandler         - callback the transport invokes per inbound message
//
// The correlation id is always carried as transport metadata, never folded
// into the payload by the caller.
//
// ============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetryMessagePublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Must not fail: errors are logged and the message dropped.
    async fn on_message(&self, message: InboundMessage);
}

#[async_trait]
pub trait Transport: MessagePublisher {
    fn protocol(&self) -> Protocol;

    /// Start consuming `channels`, calling `handler` for every message until
    /// `shutdown` flips to true. Worker scheduling is owned by the transport.
    async fn subscribe(
        &self,
        channels: &[String],
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, RelayError>;
}

/// RetryMessagePublisher backed by the inbound binding.
pub struct InboundRetryPublisher {
    inner: Arc<dyn MessagePublisher>,
    protocol: Protocol,
}

impl InboundRetryPublisher {
    pub fn new(inner: Arc<dyn MessagePublisher>, protocol: Protocol) -> Self {
        Self { inner, protocol }
    }
}

#[async_trait]
impl RetryMessagePublisher for InboundRetryPublisher {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        tracing::info!(
            transport = %self.protocol,
            channel = %channel,
            correlation_id = %correlation_id,
            "Publishing retry message"
        );
        self.inner.publish(channel, payload, correlation_id).await
    }
}

/// Outbound publisher protected by a circuit breaker: once the broker has
/// failed often enough, publishes fail fast until the breaker half-opens.
pub struct GuardedPublisher {
    inner: Arc<dyn MessagePublisher>,
    breaker: CircuitBreaker,
    protocol: Protocol,
}

impl GuardedPublisher {
    pub fn new(inner: Arc<dyn MessagePublisher>, breaker: CircuitBreaker, protocol: Protocol) -> Self {
        Self { inner, breaker, protocol }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.get_state()
    }
}

#[async_trait]
impl MessagePublisher for GuardedPublisher {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        match self
            .breaker
            .call(self.inner.publish(channel, payload, correlation_id))
            .await
        {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    transport = %self.protocol,
                    channel = %channel,
                    "Circuit breaker open - outbound transport unavailable"
                );
                Err(RelayError::transport(self.protocol.as_str(), "circuit breaker open"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    transport = %self.protocol,
                    channel = %channel,
                    "Failed to publish"
                );
                Err(e)
            }
        }
    }
}
