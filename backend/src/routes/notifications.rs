//! Notification and maps routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{maps, notifications};
use crate::state::AppState;

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications/unread", get(notifications::unread))
        .route("/notifications/:id/read", post(notifications::mark_read))
}

pub fn maps_routes() -> Router<AppState> {
    Router::new()
        .route("/maps/coordinates", get(maps::coordinates))
        .route("/maps/distance-time", get(maps::distance_time))
        .route("/maps/autocomplete", get(maps::autocomplete))
}
