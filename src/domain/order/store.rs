use dashmap::DashMap;

use super::value_objects::{Order, OrderId};

// ============================================================================
// Order Store
// ============================================================================
//
// Volatile lookup keyed by order id. Safe for concurrent get/put from any
// number of listener workers; last write wins, no cross-key ordering.
//
// ============================================================================

pub trait OrderStore: Send + Sync {
    fn put(&self, order: Order);
    fn get(&self, id: OrderId) -> Option<Order>;
    fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn put(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.orders.len()
    }
}
