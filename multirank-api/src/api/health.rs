//! Health endpoint (no auth required)

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "multirank-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
