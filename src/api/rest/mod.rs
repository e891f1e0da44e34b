pub mod deliveries;
pub mod drivers;
pub mod map;
pub mod routes;
pub mod settings;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(deliveries::router())
        .merge(drivers::router())
        .merge(routes::router())
        .merge(map::router())
        .merge(settings::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/events", get(ws::sse_handler))
        .with_state(state)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    drivers: usize,
    deliveries: usize,
    routes_generated: bool,
    optimizing: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let optimizing = state.active_run.lock().await.is_some();
    let store = state.store.lock().await;

    Json(HealthResponse {
        status: "ok",
        drivers: store.drivers().len(),
        deliveries: store.delivery_count(),
        routes_generated: store.routes_generated(),
        optimizing,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
