use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::mutations;
use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings/depot", get(get_depot).put(put_depot))
}

async fn get_depot(State(state): State<Arc<AppState>>) -> Json<NamedLocation> {
    let store = state.store.lock().await;
    Json(store.depot().clone())
}

async fn put_depot(
    State(state): State<Arc<AppState>>,
    Json(depot): Json<NamedLocation>,
) -> Result<Json<NamedLocation>, AppError> {
    Ok(Json(mutations::set_depot(&state, depot).await?))
}
