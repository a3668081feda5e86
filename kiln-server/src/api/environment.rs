//! Environment API Handlers
//!
//! HTTP endpoints for the runtime inventory.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use kiln_core::domain::EnvironmentEntry;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::environment_service;

/// GET /api/environments
/// List built images and running containers derived from them
pub async fn list_environments(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EnvironmentEntry>>> {
    tracing::debug!("listing environments");

    let environments = environment_service::list_environments(&state.docker).await?;
    Ok(Json(environments))
}

/// DELETE /api/environments/{name}
/// Remove a built image by reference (`name:tag`)
pub async fn remove_environment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("removing environment image: {}", name);

    environment_service::remove_environment(&state.docker, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
