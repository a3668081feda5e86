//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::build::BuildError;
use crate::service::environment::EnvironmentError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!("runtime unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::AlreadyBuilding(name) => {
                ApiError::Conflict(format!("a build named {} is already in progress", name))
            }
            BuildError::InvalidSource(msg) | BuildError::InvalidRequest(msg) => {
                ApiError::BadRequest(msg)
            }
            BuildError::NotFound(name) => ApiError::NotFound(format!("no build named {}", name)),
        }
    }
}

impl From<EnvironmentError> for ApiError {
    fn from(err: EnvironmentError) -> Self {
        match err {
            EnvironmentError::RuntimeUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            EnvironmentError::RuntimeFailed(msg) => ApiError::InternalError(msg),
            EnvironmentError::NotFound(reference) => {
                ApiError::NotFound(format!("no such environment image: {}", reference))
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
