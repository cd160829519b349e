//! Health check endpoint.

use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness probe. Answers as soon as the router is serving.
async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
