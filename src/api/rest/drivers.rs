use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::Json;
use axum::Router;

use crate::api::rest::deliveries::RemovedResponse;
use crate::engine::mutations;
use crate::error::AppError;
use crate::models::driver::{Driver, NewDriver};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/drivers",
            get(list_drivers).post(create_driver).delete(delete_all_drivers),
        )
        .route("/drivers/:id", delete(delete_driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let store = state.store.lock().await;
    Json(store.drivers().to_vec())
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDriver>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = mutations::add_driver(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    mutations::delete_driver(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_all_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RemovedResponse>, AppError> {
    let removed = mutations::delete_all_drivers(&state).await?;
    Ok(Json(RemovedResponse { removed }))
}
