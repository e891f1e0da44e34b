use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::export::export_routes_csv;
use crate::engine::finalize::{finalize_routes, FinalizeReport};
use crate::engine::mutations;
use crate::engine::optimize::{self, OptimizationRun};
use crate::engine::summary::summarize_routes;
use crate::error::AppError;
use crate::models::route::RouteView;
use crate::state::AppState;
use crate::store::DragCommand;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/reorder", post(reorder))
        .route("/optimize", post(start_optimization))
        .route("/optimize/:id", get(get_run).delete(cancel_run))
        .route("/finalize", post(finalize))
        .route("/export", get(export))
}

#[derive(Serialize)]
pub struct RoutesResponse {
    pub revision: u64,
    pub routes_generated: bool,
    pub routes: Vec<RouteView>,
}

#[derive(Serialize)]
pub struct ReorderResponse {
    pub applied: bool,
    #[serde(flatten)]
    pub routes: RoutesResponse,
}

#[derive(Deserialize)]
pub struct OptimizeParams {
    #[serde(default)]
    pub wait: bool,
}

async fn routes_response(state: &AppState) -> RoutesResponse {
    let store = state.store.lock().await;
    RoutesResponse {
        revision: store.revision(),
        routes_generated: store.routes_generated(),
        routes: summarize_routes(&store),
    }
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Json<RoutesResponse> {
    Json(routes_response(&state).await)
}

async fn reorder(
    State(state): State<Arc<AppState>>,
    Json(drag): Json<DragCommand>,
) -> Json<ReorderResponse> {
    let applied = mutations::reorder(&state, &drag).await;
    Json(ReorderResponse {
        applied,
        routes: routes_response(&state).await,
    })
}

/// Starts a run and answers 202 with its id, or waits for the result when
/// `?wait=true`.
async fn start_optimization(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OptimizeParams>,
) -> Result<(StatusCode, Json<OptimizationRun>), AppError> {
    let (run, handle) = optimize::start_optimization(state.clone()).await?;

    if !params.wait {
        return Ok((StatusCode::ACCEPTED, Json(run)));
    }

    handle
        .await
        .map_err(|err| AppError::Internal(format!("optimization task failed: {err}")))?;
    let finished = optimize::get_run(&state, run.id)?;
    Ok((StatusCode::OK, Json(finished)))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OptimizationRun>, AppError> {
    Ok(Json(optimize::get_run(&state, id)?))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<OptimizationRun>), AppError> {
    let run = optimize::cancel_run(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

async fn finalize(State(state): State<Arc<AppState>>) -> Result<Json<FinalizeReport>, AppError> {
    Ok(Json(finalize_routes(&state).await?))
}

async fn export(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let csv = {
        let store = state.store.lock().await;
        export_routes_csv(&store)?
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"routes.csv\""),
        ],
        csv,
    )
        .into_response())
}
