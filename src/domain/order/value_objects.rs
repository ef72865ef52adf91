use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Initiated,
    Accepted,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Enum name as it appears on the wire and in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Initiated => "INITIATED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LineItem {
    pub price: f64,
    pub quantity: i64,
}

impl LineItem {
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// The only entity with a lifecycle. `total_amount` is null for orders
/// recorded from delivery events.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub total_amount: Option<f64>,
    pub status: OrderStatus,
}

impl Order {
    pub fn initiated(id: OrderId, items: &[LineItem]) -> Self {
        Self {
            id,
            total_amount: Some(total_of(items)),
            status: OrderStatus::Initiated,
        }
    }

    pub fn shipped(id: OrderId) -> Self {
        Self {
            id,
            total_amount: None,
            status: OrderStatus::Shipped,
        }
    }
}

/// Σ price × quantity in item order, using Kahan compensated summation so
/// that e.g. ten items at 0.10 total exactly 1.0.
pub fn total_of(items: &[LineItem]) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    let mut simple_sum = 0.0_f64;

    for item in items {
        let value = item.subtotal();
        simple_sum += value;

        let adjusted = value - compensation;
        let next = sum + adjusted;
        compensation = (next - sum) - adjusted;
        sum = next;
    }

    let total = sum - compensation;
    // Infinite subtotals poison the compensation term with NaN
    if total.is_nan() && simple_sum.is_infinite() {
        simple_sum
    } else {
        total
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
