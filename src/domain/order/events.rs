use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use super::value_objects::{LineItem, OrderId, OrderStatus};

// ============================================================================
// Order Events - wire entities exchanged over the channels
// ============================================================================
//
// Field names are camelCase and identical on every transport. Encoding is a
// single-line JSON object per message.
//
// ============================================================================

/// Implemented by every entity that travels over a channel.
pub trait WireEvent: Serialize {
    fn entity_name() -> &'static str;

    fn encode(&self) -> Result<String, RelayError>
    where
        Self: Sized,
    {
        serde_json::to_string(self).map_err(|source| RelayError::Serialization {
            entity: Self::entity_name(),
            source,
        })
    }
}

/// Inbound on new-orders.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub id: OrderId,
    pub order_items: Vec<LineItem>,
}

impl WireEvent for OrderRequest {
    fn entity_name() -> &'static str { "OrderRequest" }
}

/// Inbound on to-be-cancelled-orders and retry-failed-cancelled-orders.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CancelOrderRequest {
    pub id: OrderId,
}

impl WireEvent for CancelOrderRequest {
    fn entity_name() -> &'static str { "CancelOrderRequest" }
}

/// Inbound on out-for-delivery-orders.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutForDelivery {
    pub order_id: OrderId,
    pub delivery_address: String,
    pub delivery_date: String,
}

impl WireEvent for OutForDelivery {
    fn entity_name() -> &'static str { "OutForDelivery" }
}

/// Outbound on cancelled-orders.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CancellationReference {
    pub reference: OrderId,
    pub status: OrderStatus,
}

impl CancellationReference {
    pub fn cancelled(reference: OrderId) -> Self {
        Self {
            reference,
            status: OrderStatus::Cancelled,
        }
    }
}

impl WireEvent for CancellationReference {
    fn entity_name() -> &'static str { "CancellationReference" }
}

/// Outbound on accepted-orders, forwarded verbatim from the update endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderAccepted {
    pub id: OrderId,
    pub status: OrderStatus,
    pub timestamp: String,
}

impl WireEvent for OrderAccepted {
    fn entity_name() -> &'static str { "OrderAccepted" }
}

impl WireEvent for super::value_objects::Order {
    fn entity_name() -> &'static str { "Order" }
}
