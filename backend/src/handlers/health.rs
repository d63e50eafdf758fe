//! Liveness endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "Ride-hailing API Server"
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: String,
    live_connections: usize,
    version: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match state.store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if db_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        live_connections: state.ws_state.connection_count().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
