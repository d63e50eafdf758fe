//! Ride routes

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::rides;
use crate::state::AppState;

pub fn ride_routes() -> Router<AppState> {
    Router::new()
        .route("/rides", post(rides::create_ride))
        .route("/rides/estimate", post(rides::estimate_fare))
        .route("/rides/active", get(rides::active_ride))
        .route("/rides/history", get(rides::ride_history))
        .route("/rides/:id", get(rides::get_ride))
        .route("/rides/:id/accept", post(rides::accept_ride))
        .route("/rides/:id/start", post(rides::start_ride))
        .route("/rides/:id/complete", post(rides::complete_ride))
        .route("/rides/:id/location", patch(rides::update_location))
        .route("/rides/:id/cancel", post(rides::cancel_ride))
        .route("/rides/:id/rate", post(rides::rate_ride))
}
