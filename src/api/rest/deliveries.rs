use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::engine::import::{import_csv, ImportReport};
use crate::engine::mutations::{self, DeliveryInput};
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/deliveries",
            get(list_deliveries)
                .post(create_delivery)
                .delete(delete_all_deliveries),
        )
        .route("/deliveries/import", post(import_deliveries))
        .route("/deliveries/:id", delete(delete_delivery))
}

#[derive(Serialize)]
pub struct DeliveryEntry {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub route_id: String,
}

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryEntry>> {
    let store = state.store.lock().await;
    let entries = store
        .routes()
        .iter()
        .flat_map(|route| {
            route.deliveries.iter().map(move |delivery| DeliveryEntry {
                delivery: delivery.clone(),
                route_id: route.id.clone(),
            })
        })
        .collect();
    Json(entries)
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeliveryInput>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let delivery = mutations::create_delivery(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn delete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, AppError> {
    let removed = mutations::delete_delivery(&state, &id).await?;
    Ok(Json(removed))
}

async fn delete_all_deliveries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RemovedResponse>, AppError> {
    let removed = mutations::delete_all_deliveries(&state).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// Body is raw CSV text.
async fn import_deliveries(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ImportReport>, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("csv body is empty".to_string()));
    }
    let report = import_csv(&state, &body).await?;
    Ok(Json(report))
}
