use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::domain::order::{OrderAccepted, OrderId, OrderStatus};
use crate::messaging::CORRELATION_KEY;
use super::server::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    status: String,
}

/// Body of the update endpoint.
#[derive(Debug, Deserialize)]
pub struct OrderUpdateRequest {
    id: OrderId,
    status: OrderStatus,
    timestamp: String,
}

pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<OrderId>,
    query: web::Query<StatusQuery>,
) -> impl Responder {
    let id = path.into_inner();
    tracing::info!(order_id = id, status = %query.status, "Order lookup");

    match state.processor.get_order(id) {
        Some(order) if order.status.as_str() == query.status => HttpResponse::Ok().json(order),
        Some(order) => {
            tracing::warn!(
                order_id = id,
                actual = %order.status,
                expected = %query.status,
                "Order status does not match"
            );
            HttpResponse::NotFound().finish()
        }
        None => {
            tracing::warn!(order_id = id, "Order not found");
            HttpResponse::NotFound().finish()
        }
    }
}

pub async fn update_order(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Json<OrderUpdateRequest>,
) -> impl Responder {
    let body = body.into_inner();
    let correlation_id = request
        .headers()
        .get(CORRELATION_KEY)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(state.accepted_correlation_id.as_str());

    let event = OrderAccepted {
        id: body.id,
        status: body.status,
        timestamp: body.timestamp,
    };

    match state.processor.accept_order(event, correlation_id).await {
        Ok(()) => {
            tracing::info!(order_id = body.id, "Order update notification sent");
            HttpResponse::Ok().body("Notification triggered.")
        }
        Err(e) => {
            tracing::error!(error = %e, order_id = body.id, "Error processing update request");
            HttpResponse::InternalServerError().body("Failed to process update")
        }
    }
}
