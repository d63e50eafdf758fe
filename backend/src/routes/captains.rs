//! Captain self-service routes

use axum::{routing::patch, Router};

use crate::handlers::captains;
use crate::state::AppState;

pub fn captain_routes() -> Router<AppState> {
    Router::new()
        .route("/captains/me/status", patch(captains::update_status))
        .route("/captains/me/location", patch(captains::update_location))
}
