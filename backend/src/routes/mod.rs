//! Route definitions for the ride-hailing API

mod auth;
mod captains;
mod notifications;
mod rides;

use axum::{routing::get, Router};

pub use auth::auth_routes;
pub use captains::captain_routes;
pub use notifications::{maps_routes, notification_routes};
pub use rides::ride_routes;

use crate::handlers::health;
use crate::state::AppState;

/// Every API route plus health and the WebSocket endpoint
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ws", get(crate::websocket::ws_handler))
        .merge(auth_routes())
        .merge(ride_routes())
        .merge(captain_routes())
        .merge(notification_routes())
        .merge(maps_routes())
}
