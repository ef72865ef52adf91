// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order, OrderStatus, LineItem)
// - Wire events exchanged over the channels
// - Order store (volatile lookup of shipped orders)
// - Processor (the business operations behind every inbound channel)
//
// Nothing here knows which messaging technology is in use.
//
// ============================================================================

pub mod events;
pub mod processor;
pub mod store;
pub mod value_objects;

pub use events::*;
pub use processor::{CancelFaultInjection, OrderProcessor};
pub use store::{InMemoryOrderStore, OrderStore};
pub use value_objects::*;
