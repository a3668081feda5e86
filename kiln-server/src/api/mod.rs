//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain.

pub mod build;
pub mod environment;
pub mod error;
pub mod health;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use kiln_builder::DockerClient;

use crate::config::Config;
use crate::registry::BuildRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BuildRegistry>,
    pub docker: DockerClient,
    pub config: Arc<Config>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Build endpoints
        .route("/api/builds", post(build::start_build))
        .route("/api/builds", get(build::list_builds))
        .route("/api/builds/{name}", get(build::get_build))
        .route("/api/builds/{name}/logs", get(build::stream_logs))
        .route("/api/builds/{name}/cancel", post(build::cancel_build))
        // Environment endpoints
        .route("/api/environments", get(environment::list_environments))
        .route("/api/environments/{name}", delete(environment::remove_environment))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
