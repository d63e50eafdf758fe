//! HTTP middleware: request tracing, rate limiting and party authentication

pub mod auth;
mod rate_limiter;
mod tracing;

pub use auth::{AuthenticatedParty, CaptainParty, RiderParty};
pub use rate_limiter::{rate_limit, rate_limit_janitor, RateLimiter};
pub use tracing::request_tracing;
