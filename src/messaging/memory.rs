use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Protocol;
use crate::error::RelayError;
use super::envelope::{Frame, InboundMessage, CORRELATION_KEY};
use super::publisher::{MessageHandler, MessagePublisher, Transport};

// ============================================================================
// In-Memory Binding
// ============================================================================
//
// Process-local hub: one broadcast channel per name, headers carried
// alongside the frame like Kafka record headers. Used for local runs and for
// end-to-end tests of the listener/processor/retry loop without a broker.
//
// ============================================================================

const CHANNEL_CAPACITY: usize = 1024;
/// Most recent publishes kept for inspection; older entries are evicted.
const PUBLISHED_LOG_CAPACITY: usize = 256;

/// A message as it was handed to `publish`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
    pub correlation_id: String,
}

pub struct MemoryTransport {
    channels: DashMap<String, broadcast::Sender<InboundMessage>>,
    published: Mutex<VecDeque<PublishedMessage>>,
    log_capacity: usize,
    offline: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::with_log_capacity(PUBLISHED_LOG_CAPACITY)
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            published: Mutex::new(VecDeque::with_capacity(log_capacity)),
            log_capacity,
            offline: AtomicBool::new(false),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<InboundMessage> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// While offline every publish fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The most recent publishes, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn published_on(&self, channel: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.channel == channel)
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for MemoryTransport {
    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::transport("memory", "hub is offline"));
        }

        if self.log_capacity > 0 {
            let mut log = self
                .published
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if log.len() == self.log_capacity {
                log.pop_front();
            }
            log.push_back(PublishedMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
                correlation_id: correlation_id.to_string(),
            });
        }

        let message = InboundMessage::new(channel, Frame::Text(payload.to_string()))
            .with_header(CORRELATION_KEY, correlation_id);

        // No subscribers is not an error: the message is simply not observed
        let receivers = self.sender(channel).send(message).unwrap_or(0);
        tracing::debug!(channel = %channel, receivers, "Published to memory hub");
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Memory
    }

    async fn subscribe(
        &self,
        channels: &[String],
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, RelayError> {
        let (tx, mut rx) = mpsc::channel::<InboundMessage>(CHANNEL_CAPACITY);

        // Receivers are created before returning so nothing published after
        // subscribe() is missed.
        for channel in channels {
            let mut receiver = self.sender(channel).subscribe();
            let tx = tx.clone();
            let mut shutdown = shutdown.clone();
            let channel = channel.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }

                        received = receiver.recv() => match received {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(channel = %channel, skipped, "Memory subscriber lagged, messages lost");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            });
        }
        drop(tx);

        tracing::info!(?channels, "Subscribed to memory hub");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Shutdown signal received, memory consumer exiting");
                            break;
                        }
                    }

                    message = rx.recv() => {
                        let Some(message) = message else { break };
                        let handler = handler.clone();
                        tokio::spawn(async move { handler.on_message(message).await });
                    }
                }
            }
        });

        Ok(handle)
    }
}
