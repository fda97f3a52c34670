//! Health and metrics endpoints

use actix_web::{web, HttpResponse, Responder};
use message_bus::NatsClient;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use storage::Database;

/// Shared handler state
pub struct AppState {
    pub db: Arc<Database>,
    pub broker: Option<Arc<NatsClient>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    database: &'static str,
    broker: &'static str,
}

/// Route registration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(prometheus_metrics));
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let database = match state.db.health_check().await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    let broker = match &state.broker {
        Some(client) if client.is_connected().await => "up",
        Some(_) => "down",
        None => "disabled",
    };

    let healthy = database == "up" && broker != "down";

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        service: "drip-engine",
        version: env!("CARGO_PKG_VERSION"),
        database,
        broker,
    };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

async fn prometheus_metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => HttpResponse::Ok()
                .content_type("text/plain; version=0.0.4")
                .body(body),
            Err(e) => HttpResponse::InternalServerError()
                .body(format!("Failed to encode metrics: {}", e)),
        },
        Err(e) => {
            HttpResponse::InternalServerError().body(format!("Failed to gather metrics: {}", e))
        }
    }
}
