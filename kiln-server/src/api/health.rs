//! Health check endpoint

use axum::Json;
use serde_json::{Value, json};

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kiln-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
