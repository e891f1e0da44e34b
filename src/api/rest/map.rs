//! Data for the map view and its click contract.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::state::{AppState, ChangeKind};
use crate::store::Selection;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/map", get(map_view))
        .route("/selection", delete(clear_selection))
        .route("/selection/route/:id", post(select_route))
        .route("/selection/delivery/:id", post(select_delivery))
}

#[derive(Serialize)]
pub struct MapMarker {
    pub delivery_id: String,
    pub route_id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub color: String,
    /// True when the marker's route is the selected one.
    pub highlighted: bool,
}

#[derive(Serialize)]
pub struct MapView {
    pub depot: NamedLocation,
    pub markers: Vec<MapMarker>,
    pub colors: HashMap<String, String>,
    pub selection: Selection,
}

async fn map_view(State(state): State<Arc<AppState>>) -> Json<MapView> {
    let store = state.store.lock().await;
    let selection = store.selection().clone();

    let markers = store
        .routes()
        .iter()
        .flat_map(|route| {
            let highlighted = selection.route_id.as_deref() == Some(route.id.as_str());
            let color = if selection.route_id.is_some() && !highlighted {
                route.color_dimmed.clone()
            } else {
                route.color.clone()
            };
            route.deliveries.iter().map(move |delivery| MapMarker {
                delivery_id: delivery.id.clone(),
                route_id: route.id.clone(),
                name: delivery.name.clone(),
                address: delivery.address.clone(),
                lat: delivery.location.lat,
                lng: delivery.location.lng,
                color: color.clone(),
                highlighted,
            })
        })
        .collect();

    Json(MapView {
        depot: store.depot().clone(),
        markers,
        colors: store.delivery_color_map(),
        selection,
    })
}

async fn select_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Selection>, AppError> {
    let mut store = state.store.lock().await;
    if store.route(&id).is_none() {
        return Err(AppError::NotFound(format!("route {id} not found")));
    }
    store.select_route(&id);
    state.publish(&store, ChangeKind::SelectionChanged);
    Ok(Json(store.selection().clone()))
}

async fn select_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Selection>, AppError> {
    let mut store = state.store.lock().await;
    if !store.select_delivery(&id) {
        return Err(AppError::NotFound(format!("delivery {id} not found")));
    }
    state.publish(&store, ChangeKind::SelectionChanged);
    Ok(Json(store.selection().clone()))
}

async fn clear_selection(State(state): State<Arc<AppState>>) -> Json<Selection> {
    let mut store = state.store.lock().await;
    store.clear_selection();
    state.publish(&store, ChangeKind::SelectionChanged);
    Json(store.selection().clone())
}
