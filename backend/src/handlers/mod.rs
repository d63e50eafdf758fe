//! API handlers for the ride-hailing backend

pub mod auth;
pub mod captains;
pub mod health;
pub mod maps;
pub mod notifications;
pub mod rides;

// Re-export party extractors from middleware for handler use
pub use crate::middleware::auth::{AuthenticatedParty, CaptainParty, RiderParty};
