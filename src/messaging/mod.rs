// ============================================================================
// Messaging Layer
// ============================================================================
//
// Technology-neutral contracts (publisher.rs), envelope normalization
// (envelope.rs), the inbound dispatcher (listener.rs) and one binding per
// supported technology. The domain only ever sees MessagePublisher.
//
// ============================================================================

pub mod envelope;
pub mod factory;
pub mod kafka;
pub mod listener;
pub mod memory;
pub mod publisher;
pub mod redis;

pub use envelope::{
    CorrelationPrecedence, EnvelopeCodec, MissingCorrelation, WireFormat, CORRELATION_KEY,
};
pub use factory::{build_binding, Binding};
pub use listener::InboundListener;
pub use memory::MemoryTransport;
pub use publisher::{
    GuardedPublisher, InboundRetryPublisher, MessageHandler, MessagePublisher,
    RetryMessagePublisher, Transport,
};

#[cfg(test)]
pub use publisher::{MockMessagePublisher, MockRetryMessagePublisher};
