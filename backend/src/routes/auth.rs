//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/riders/register", post(auth::register_rider))
        .route("/auth/captains/register", post(auth::register_captain))
        .route("/auth/riders/login", post(auth::login_rider))
        .route("/auth/captains/login", post(auth::login_captain))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).delete(auth::delete_me))
}
