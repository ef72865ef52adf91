use actix_web::web;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod domain;
mod error;
mod messaging;
mod metrics;
mod retry;
mod utils;

use crate::config::{AppConfig, ObservabilityConfig};
use domain::order::{CancelFaultInjection, InMemoryOrderStore, OrderProcessor};
use messaging::{
    build_binding, EnvelopeCodec, GuardedPublisher, InboundListener, InboundRetryPublisher,
    RetryMessagePublisher,
};
use retry::{RetryScheduler, TimerPool};
use utils::CircuitBreaker;

/// Structured logging with environment-based filtering. RUST_LOG wins over
/// the configured level, e.g. RUST_LOG=debug.
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    tracing::info!(
        receive = %config.receive.protocol,
        send = %config.send.protocol,
        "Starting order relay"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 2. Transport bindings ===
    let inbound = build_binding(config.receive.protocol, &config).await?;
    let outbound = if config.send.protocol == config.receive.protocol {
        inbound.clone()
    } else {
        build_binding(config.send.protocol, &config).await?
    };

    let guarded = Arc::new(GuardedPublisher::new(
        outbound.publisher.clone(),
        CircuitBreaker::new((&config.circuit_breaker).into()),
        config.send.protocol,
    ));

    let retry_publisher: Option<Arc<dyn RetryMessagePublisher>> = if config.receive.retry_publisher {
        Some(Arc::new(InboundRetryPublisher::new(
            inbound.publisher.clone(),
            inbound.protocol(),
        )))
    } else {
        tracing::warn!(
            protocol = %config.receive.protocol,
            "Inbound binding has no retry publisher, diverted cancellations will not be republished"
        );
        None
    };

    // === 3. Retry scheduler on its own timer pool ===
    let retry_config = &config.retry.cancel_order;
    let timer_pool = Arc::new(TimerPool::new(retry_config.timer_threads)?);
    let retry = RetryScheduler::from_config(
        retry_config,
        timer_pool.clone(),
        retry_publisher,
        metrics.clone(),
    );

    // === 4. Processor and listener ===
    let processor = Arc::new(OrderProcessor::new(
        guarded.clone(),
        Arc::new(InMemoryOrderStore::new()),
        retry,
        CancelFaultInjection {
            enabled: retry_config.enabled,
            sentinel_order_id: retry_config.sentinel_order_id,
        },
        config.channels.clone(),
        metrics.clone(),
    ));

    let codec = EnvelopeCodec::new(
        config.receive.wire_format(),
        config.receive.correlation_precedence,
        config.receive.missing_correlation,
    );
    let listener = Arc::new(InboundListener::new(
        processor.clone(),
        config.channels.clone(),
        codec,
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = inbound
        .transport
        .subscribe(&config.channels.inbound(), listener, shutdown_rx)
        .await?;

    // === 5. HTTP API ===
    let state = web::Data::new(api::AppState {
        processor,
        outbound: guarded,
        metrics,
        receive_protocol: config.receive.protocol,
        send_protocol: config.send.protocol,
        accepted_correlation_id: config.send.accepted_correlation_id.clone(),
    });
    let server = api::start_api_server(state, &config.server.host, config.server.port)?;

    // === 6. Serve until Ctrl-C, then drain ===
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl-C received, shutting down");
    };
    if let Err(e) = api::serve_until(server, ctrl_c).await {
        tracing::error!(error = %e, "API server stopped");
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "Inbound consumer task failed");
    }

    tracing::info!("Order relay stopped");
    Ok(())
}
