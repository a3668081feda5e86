//! Environment service
//!
//! Read-through inventory of the container runtime: images built by this
//! service plus running containers derived from them, recomputed on every
//! query. An unreachable runtime is surfaced as a retryable error, never
//! as an empty listing.

use kiln_builder::{DockerClient, RuntimeError};
use kiln_core::domain::EnvironmentEntry;

/// Service error type
#[derive(Debug)]
pub enum EnvironmentError {
    /// The runtime's query surface is unreachable; retry later
    RuntimeUnavailable(String),
    /// The runtime answered with an error
    RuntimeFailed(String),
    /// The named image does not exist
    NotFound(String),
}

/// List all environments: images first, then running containers.
///
/// Both listings are independently sourced from the runtime and may be
/// stale by the time the caller acts on them; callers re-query rather than
/// assume consistency.
pub async fn list_environments(
    docker: &DockerClient,
) -> Result<Vec<EnvironmentEntry>, EnvironmentError> {
    let mut environments = docker.list_images().await.map_err(map_runtime_error)?;
    let containers = docker.list_containers().await.map_err(map_runtime_error)?;
    environments.extend(containers);

    tracing::debug!("inventory holds {} environment(s)", environments.len());
    Ok(environments)
}

/// Remove a built image by reference (`name:tag`).
pub async fn remove_environment(
    docker: &DockerClient,
    reference: &str,
) -> Result<(), EnvironmentError> {
    docker
        .remove_image(reference)
        .await
        .map_err(map_runtime_error)?;

    tracing::info!("environment image removed: {}", reference);
    Ok(())
}

fn map_runtime_error(err: RuntimeError) -> EnvironmentError {
    match err {
        RuntimeError::Unavailable(_) => EnvironmentError::RuntimeUnavailable(err.to_string()),
        RuntimeError::NotFound(reference) => EnvironmentError::NotFound(reference),
        other => EnvironmentError::RuntimeFailed(other.to_string()),
    }
}
