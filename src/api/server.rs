use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use std::future::Future;
use std::sync::Arc;

use crate::config::Protocol;
use crate::domain::order::OrderProcessor;
use crate::messaging::GuardedPublisher;
use crate::metrics::Metrics;
use super::orders;

/// Shared state handed to every handler.
pub struct AppState {
    pub processor: Arc<OrderProcessor>,
    pub outbound: Arc<GuardedPublisher>,
    pub metrics: Arc<Metrics>,
    pub receive_protocol: Protocol,
    pub send_protocol: Protocol,
    /// Used when an update request carries no correlation header.
    pub accepted_correlation_id: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders/{id}", web::get().to(orders::get_order))
        .route("/orders", web::put().to(orders::update_order))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

/// Bind the API server. The returned server runs once awaited.
pub fn start_api_server(state: web::Data<AppState>, host: &str, port: u16) -> std::io::Result<Server> {
    tracing::info!("Starting API server on http://{}:{}", host, port);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind((host, port))?
        .disable_signals()
        .run();
    Ok(server)
}

/// Run `server` until it stops by itself or `shutdown` resolves, then stop it
/// gracefully so in-flight requests drain.
pub async fn serve_until<S>(server: Server, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()>,
{
    let handle = server.handle();
    let mut task = actix_web::rt::spawn(server);

    tokio::select! {
        joined = &mut task => return joined.map_err(std::io::Error::other)?,
        _ = shutdown => {}
    }

    handle.stop(true).await;
    task.await.map_err(std::io::Error::other)?
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.render() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    let circuit = state.outbound.circuit_state();

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-relay",
        "receive": state.receive_protocol.as_str(),
        "send": state.send_protocol.as_str(),
        "outbound_circuit": circuit.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::domain::order::{CancelFaultInjection, InMemoryOrderStore, OutForDelivery};
    use crate::messaging::{MemoryTransport, CORRELATION_KEY};
    use crate::retry::{BackoffSchedule, ManualScheduler, PolicyKind, RetryScheduler};
    use crate::utils::{CircuitBreaker, CircuitBreakerConfig};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use std::time::Duration;

    fn state(hub: Arc<MemoryTransport>) -> web::Data<AppState> {
        let metrics = Arc::new(Metrics::new().unwrap());
        let outbound = Arc::new(GuardedPublisher::new(
            hub,
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            Protocol::Memory,
        ));
        let retry = RetryScheduler::new(
            Arc::new(ManualScheduler::new()),
            None,
            BackoffSchedule {
                initial_delay: Duration::from_secs(5),
                multiplier: 2.0,
                buffer: Duration::from_secs(2),
            },
            PolicyKind::SuppressUntilFinal.build(),
            3,
            metrics.clone(),
        );
        let processor = Arc::new(OrderProcessor::new(
            outbound.clone(),
            Arc::new(InMemoryOrderStore::new()),
            retry,
            CancelFaultInjection {
                enabled: true,
                sentinel_order_id: 999,
            },
            ChannelConfig::default(),
            metrics.clone(),
        ));
        processor.process_order_delivery(OutForDelivery {
            order_id: 11,
            delivery_address: "Dock 4".to_string(),
            delivery_date: "2025-03-01".to_string(),
        });

        web::Data::new(AppState {
            processor,
            outbound,
            metrics,
            receive_protocol: Protocol::Memory,
            send_protocol: Protocol::Memory,
            accepted_correlation_id: "12345".to_string(),
        })
    }

    #[actix_web::test]
    async fn test_get_order_requires_exact_status() {
        let app = test::init_service(
            App::new()
                .app_data(state(Arc::new(MemoryTransport::new())))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/orders/11?status=SHIPPED").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            serde_json::json!({"id": 11, "totalAmount": null, "status": "SHIPPED"})
        );

        for uri in ["/orders/11?status=shipped", "/orders/11?status=INITIATED", "/orders/12?status=SHIPPED"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_update_publishes_accepted_event() {
        let hub = Arc::new(MemoryTransport::new());
        let app = test::init_service(App::new().app_data(state(hub.clone())).configure(configure)).await;

        let req = test::TestRequest::put()
            .uri("/orders")
            .set_json(serde_json::json!({"id": 5, "status": "ACCEPTED", "timestamp": "2025-01-01T10:00:00Z"}))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, web::Bytes::from_static(b"Notification triggered."));

        let req = test::TestRequest::put()
            .uri("/orders")
            .insert_header((CORRELATION_KEY, "from-caller"))
            .set_json(serde_json::json!({"id": 6, "status": "ACCEPTED", "timestamp": "t"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let accepted = hub.published_on("accepted-orders");
        assert_eq!(accepted.len(), 2);
        assert_eq!(
            accepted[0].payload,
            r#"{"id":5,"status":"ACCEPTED","timestamp":"2025-01-01T10:00:00Z"}"#
        );
        assert_eq!(accepted[0].correlation_id, "12345");
        assert_eq!(accepted[1].correlation_id, "from-caller");
    }

    #[actix_web::test]
    async fn test_update_returns_500_when_transport_fails() {
        let hub = Arc::new(MemoryTransport::new());
        hub.set_offline(true);
        let app = test::init_service(App::new().app_data(state(hub)).configure(configure)).await;

        let req = test::TestRequest::put()
            .uri("/orders")
            .set_json(serde_json::json!({"id": 5, "status": "ACCEPTED", "timestamp": "t"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_serve_until_stops_server_on_shutdown() {
        let server = HttpServer::new(|| App::new().configure(configure))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap()
            .disable_signals()
            .run();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let serving = actix_web::rt::spawn(serve_until(server, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[actix_web::test]
    async fn test_health_and_metrics() {
        let app = test::init_service(
            App::new()
                .app_data(state(Arc::new(MemoryTransport::new())))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["outbound_circuit"], "closed");
        assert_eq!(health["receive"], "memory");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("relay_orders_stored 1"));
    }
}
