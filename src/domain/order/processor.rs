use std::sync::Arc;

use crate::config::ChannelConfig;
use crate::error::RelayError;
use crate::messaging::MessagePublisher;
use crate::metrics::Metrics;
use crate::retry::RetryScheduler;

use super::events::{CancelOrderRequest, CancellationReference, OrderAccepted, OrderRequest, OutForDelivery, WireEvent};
use super::store::OrderStore;
use super::value_objects::{Order, OrderId};

// ============================================================================
// Order Processor
// ============================================================================
//
// Business logic between inbound listeners and the outbound publisher:
//
//   new order        ──► Order{INITIATED, total} ──► wip-orders
//   cancel order     ──► CancellationReference   ──► cancelled-orders
//       (sentinel id + retries enabled)          ──► RetryScheduler
//   retried cancel   ──► CancellationReference   ──► cancelled-orders
//   out for delivery ──► Order{SHIPPED}          ──► order store
//   accepted         ──► OrderAccepted verbatim  ──► accepted-orders
//
// ============================================================================

/// Reroutes cancellations of one reserved order id through the retry
/// scheduler to exercise downstream retry handling.
#[derive(Debug, Clone, Copy)]
pub struct CancelFaultInjection {
    pub enabled: bool,
    pub sentinel_order_id: OrderId,
}

impl CancelFaultInjection {
    fn diverts(&self, id: OrderId) -> bool {
        self.enabled && id == self.sentinel_order_id
    }
}

pub struct OrderProcessor {
    publisher: Arc<dyn MessagePublisher>,
    store: Arc<dyn OrderStore>,
    retry: RetryScheduler,
    fault_injection: CancelFaultInjection,
    channels: ChannelConfig,
    metrics: Arc<Metrics>,
}

impl OrderProcessor {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        store: Arc<dyn OrderStore>,
        retry: RetryScheduler,
        fault_injection: CancelFaultInjection,
        channels: ChannelConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            publisher,
            store,
            retry,
            fault_injection,
            channels,
            metrics,
        }
    }

    async fn publish(&self, channel: &str, payload: &str, correlation_id: &str) -> Result<(), RelayError> {
        let result = self.publisher.publish(channel, payload, correlation_id).await;
        self.metrics.record_publish(channel, result.is_ok());
        result
    }

    pub async fn process_new_order(&self, request: OrderRequest, correlation_id: &str) -> Result<Order, RelayError> {
        tracing::info!(order_id = request.id, "Processing new order");

        let order = Order::initiated(request.id, &request.order_items);
        let payload = order.encode()?;
        self.publish(&self.channels.wip_orders, &payload, correlation_id).await?;

        tracing::info!(
            order_id = order.id,
            total_amount = ?order.total_amount,
            "Order initiated"
        );
        Ok(order)
    }

    pub async fn process_cancel_order(&self, request: CancelOrderRequest, correlation_id: &str) -> Result<(), RelayError> {
        tracing::info!(order_id = request.id, "Processing cancel order request");

        if self.fault_injection.diverts(request.id) {
            tracing::info!(
                order_id = request.id,
                "Simulating initial failure, scheduling async retries"
            );
            let payload = request.encode()?;
            self.retry.schedule(
                &self.channels.retry_failed_cancelled_orders,
                payload,
                correlation_id,
            );
            return Ok(());
        }

        self.publish_cancellation(request.id, correlation_id).await?;
        tracing::info!(order_id = request.id, "Order cancelled");
        Ok(())
    }

    pub async fn process_retry_failed_cancel_order(
        &self,
        request: CancelOrderRequest,
        correlation_id: &str,
    ) -> Result<(), RelayError> {
        tracing::info!(order_id = request.id, "Processing retried cancel order request");

        self.publish_cancellation(request.id, correlation_id).await?;
        tracing::info!(order_id = request.id, "Retry successful - order cancelled");
        Ok(())
    }

    async fn publish_cancellation(&self, id: OrderId, correlation_id: &str) -> Result<(), RelayError> {
        let payload = CancellationReference::cancelled(id).encode()?;
        self.publish(&self.channels.cancelled_orders, &payload, correlation_id).await
    }

    pub fn process_order_delivery(&self, delivery: OutForDelivery) {
        tracing::info!(order_id = delivery.order_id, "Processing order delivery initiation");

        self.store.put(Order::shipped(delivery.order_id));
        self.metrics.orders_stored.set(self.store.len() as i64);

        tracing::info!(order_id = delivery.order_id, "Order marked as shipped");
    }

    pub async fn accept_order(&self, event: OrderAccepted, correlation_id: &str) -> Result<(), RelayError> {
        let payload = event.encode()?;
        self.publish(&self.channels.accepted_orders, &payload, correlation_id).await?;

        tracing::info!(order_id = event.id, "Order accepted");
        Ok(())
    }

    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        self.store.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{InMemoryOrderStore, LineItem, OrderStatus};
    use crate::messaging::{MockMessagePublisher, MockRetryMessagePublisher, RetryMessagePublisher};
    use crate::retry::{BackoffSchedule, ManualScheduler, PolicyKind};
    use mockall::predicate::{always, eq};
    use std::time::Duration;

    struct Harness {
        processor: OrderProcessor,
        clock: Arc<ManualScheduler>,
    }

    fn harness(
        publisher: MockMessagePublisher,
        retry_publisher: Option<MockRetryMessagePublisher>,
        retries_enabled: bool,
    ) -> Harness {
        let metrics = Arc::new(Metrics::new().unwrap());
        let clock = Arc::new(ManualScheduler::new());
        let retry = RetryScheduler::new(
            clock.clone(),
            retry_publisher.map(|p| Arc::new(p) as Arc<dyn RetryMessagePublisher>),
            BackoffSchedule {
                initial_delay: Duration::from_secs(5),
                multiplier: 2.0,
                buffer: Duration::from_secs(2),
            },
            PolicyKind::SuppressUntilFinal.build(),
            3,
            metrics.clone(),
        );

        let processor = OrderProcessor::new(
            Arc::new(publisher),
            Arc::new(InMemoryOrderStore::new()),
            retry,
            CancelFaultInjection {
                enabled: retries_enabled,
                sentinel_order_id: 999,
            },
            ChannelConfig::default(),
            metrics,
        );
        Harness { processor, clock }
    }

    fn no_publish() -> MockMessagePublisher {
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();
        publisher
    }

    #[tokio::test]
    async fn test_new_order_publishes_initiated_total() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .with(
                eq("wip-orders"),
                eq(r#"{"id":42,"totalAmount":25.0,"status":"INITIATED"}"#),
                eq("corr-42"),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(publisher, None, true);
        let request = OrderRequest {
            id: 42,
            order_items: vec![
                LineItem { price: 10.0, quantity: 2 },
                LineItem { price: 5.0, quantity: 1 },
            ],
        };

        let order = h.processor.process_new_order(request, "corr-42").await.unwrap();
        assert_eq!(order.total_amount, Some(25.0));
        assert_eq!(order.status, OrderStatus::Initiated);
        // Initiated orders are published, not stored
        assert!(h.processor.get_order(42).is_none());
    }

    #[tokio::test]
    async fn test_new_order_surfaces_transport_failure() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(RelayError::transport("kafka", "broker unreachable")));

        let h = harness(publisher, None, true);
        let request = OrderRequest { id: 1, order_items: vec![] };

        let err = h.processor.process_new_order(request, "c").await.unwrap_err();
        assert!(matches!(err, RelayError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_cancel_publishes_reference_immediately() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .with(eq("cancelled-orders"), eq(r#"{"reference":7,"status":"CANCELLED"}"#), eq("corr-7"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(publisher, None, true);
        h.processor
            .process_cancel_order(CancelOrderRequest { id: 7 }, "corr-7")
            .await
            .unwrap();
        assert_eq!(h.clock.pending(), 0);
    }

    #[tokio::test]
    async fn test_sentinel_cancel_is_diverted_to_retry_scheduler() {
        let mut retry_publisher = MockRetryMessagePublisher::new();
        retry_publisher
            .expect_publish()
            .with(eq("retry-failed-cancelled-orders"), eq(r#"{"id":999}"#), eq("corr-999"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(no_publish(), Some(retry_publisher), true);
        h.processor
            .process_cancel_order(CancelOrderRequest { id: 999 }, "corr-999")
            .await
            .unwrap();

        assert_eq!(
            h.clock.due_times(),
            vec![Duration::from_secs(7), Duration::from_secs(12), Duration::from_secs(22)]
        );
        assert_eq!(h.clock.advance(Duration::from_secs(21)).await, 2);
        assert_eq!(h.clock.advance(Duration::from_secs(1)).await, 1);
    }

    #[tokio::test]
    async fn test_sentinel_cancel_publishes_directly_when_retries_disabled() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .with(eq("cancelled-orders"), always(), always())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(publisher, None, false);
        h.processor
            .process_cancel_order(CancelOrderRequest { id: 999 }, "c")
            .await
            .unwrap();
        assert_eq!(h.clock.pending(), 0);
    }

    #[tokio::test]
    async fn test_retry_failed_cancel_always_publishes_reference() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .with(eq("cancelled-orders"), eq(r#"{"reference":999,"status":"CANCELLED"}"#), eq("corr"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(publisher, None, true);
        h.processor
            .process_retry_failed_cancel_order(CancelOrderRequest { id: 999 }, "corr")
            .await
            .unwrap();
        assert_eq!(h.clock.pending(), 0);
    }

    #[tokio::test]
    async fn test_delivery_stores_shipped_order() {
        let h = harness(no_publish(), None, true);
        h.processor.process_order_delivery(OutForDelivery {
            order_id: 11,
            delivery_address: "Dock 4".to_string(),
            delivery_date: "2025-03-01".to_string(),
        });

        let order = h.processor.get_order(11).unwrap();
        assert_eq!(order, Order::shipped(11));
        assert!(h.processor.get_order(12).is_none());
    }

    #[tokio::test]
    async fn test_accept_order_forwards_event_verbatim() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .with(
                eq("accepted-orders"),
                eq(r#"{"id":5,"status":"ACCEPTED","timestamp":"2025-01-01T10:00:00Z"}"#),
                eq("12345"),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = harness(publisher, None, true);
        h.processor
            .accept_order(
                OrderAccepted {
                    id: 5,
                    status: OrderStatus::Accepted,
                    timestamp: "2025-01-01T10:00:00Z".to_string(),
                },
                "12345",
            )
            .await
            .unwrap();
    }
}
