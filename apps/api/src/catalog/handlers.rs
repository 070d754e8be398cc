//! Axum route handlers for the catalog.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::catalog::cache::LoadOutcome;
use crate::catalog::client::CatalogError;
use crate::errors::AppError;
use crate::models::plant::{CatalogEntry, EnvironmentTag, ALL_ENVIRONMENTS};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlantsQuery {
    pub environment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlantsResponse {
    pub environment: String,
    pub page: u32,
    pub loading_more: bool,
    pub plants: Vec<CatalogEntry>,
}

/// Outcome of a refresh or fetch-more trigger.
/// `status` is one of `loaded`, `skipped`, `exhausted` or `empty`.
#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub total: usize,
}

/// GET /api/v1/environments
pub async fn handle_environments(
    State(state): State<AppState>,
) -> Result<Json<Vec<EnvironmentTag>>, AppError> {
    Ok(Json(state.catalog.load_environments().await?))
}

/// GET /api/v1/plants?environment=<key>
/// Selecting an environment sticks for later requests without the parameter.
pub async fn handle_plants(
    State(state): State<AppState>,
    Query(params): Query<PlantsQuery>,
) -> Json<PlantsResponse> {
    let catalog = &state.catalog;
    if let Some(environment) = params.environment {
        catalog.select_environment(environment);
    }

    Json(PlantsResponse {
        environment: catalog.selected_environment(),
        page: catalog.current_page(),
        loading_more: catalog.is_loading_more(),
        plants: catalog.visible(),
    })
}

/// POST /api/v1/plants/refresh
pub async fn handle_refresh(State(state): State<AppState>) -> Result<Json<LoadResponse>, AppError> {
    let outcome = state.catalog.refresh().await;
    load_response(&state, outcome)
}

/// POST /api/v1/plants/more
pub async fn handle_fetch_more(
    State(state): State<AppState>,
) -> Result<Json<LoadResponse>, AppError> {
    let outcome = state.catalog.load_more().await;
    load_response(&state, outcome)
}

fn load_response(
    state: &AppState,
    outcome: Result<LoadOutcome, CatalogError>,
) -> Result<Json<LoadResponse>, AppError> {
    let (status, page, count) = match outcome {
        Ok(LoadOutcome::Loaded { page, count }) => ("loaded", Some(page), Some(count)),
        Ok(LoadOutcome::Skipped) => ("skipped", None, None),
        Ok(LoadOutcome::Exhausted) => ("exhausted", None, None),
        // Nothing new from the service; the list is left as it was.
        Err(CatalogError::EmptyResponse) => ("empty", None, None),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(LoadResponse {
        status,
        page,
        count,
        total: state.catalog.filter_by_environment(ALL_ENVIRONMENTS).len(),
    }))
}
