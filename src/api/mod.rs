// ============================================================================
// HTTP API
// ============================================================================
//
// GET  /orders/{id}?status=STATUS  - order lookup, exact status match
// PUT  /orders                     - forward an OrderAccepted notification
// GET  /metrics                    - prometheus text exposition
// GET  /health                     - breaker state and selected protocols
//
// ============================================================================

mod orders;
mod server;

pub use server::{configure, serve_until, start_api_server, AppState};
