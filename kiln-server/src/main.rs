use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod registry;
pub mod service;

use std::sync::Arc;

use kiln_builder::DockerClient;

use crate::registry::BuildRegistry;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kiln server...");

    let config = config::Config::from_env();
    config.validate().expect("Invalid configuration");

    let docker = DockerClient::new(&config.docker_bin);

    // The inventory surfaces runtime errors per request; an unreachable
    // runtime at boot is worth a warning but not fatal
    match docker.check_available().await {
        Ok(version) => tracing::info!("Container runtime ready: {}", version),
        Err(e) => tracing::warn!("Container runtime not reachable yet: {}", e),
    }

    let registry = Arc::new(BuildRegistry::new(config.log_cap));

    let addr = config.bind_addr.clone();
    let state = api::AppState {
        registry,
        docker,
        config: Arc::new(config),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
