//! Health endpoints.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

fn health_body() -> HealthResponse {
    HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(health_body()))
}

/// Readiness probe.
pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(health_body()))
}
