use thiserror::Error;

use crate::geocoding::GeocodingError;
use crate::store::StoreError;

/// Coarse classification of lifecycle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    InvalidTransition,
    Conflict,
    UpstreamUnavailable,
}

/// Errors raised by the ride lifecycle engine
#[derive(Debug, Error)]
pub enum RideError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not permitted: {0}")]
    Unauthorized(String),

    #[error("Cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },

    #[error("Ride can only be cancelled while pending or confirmed")]
    NotCancellable,

    #[error("Ride has already been rated")]
    AlreadyRated,

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Rider already has an active ride")]
    ActiveRideExists,

    #[error("Ride is no longer available")]
    RideNotAvailable,

    #[error("Captain is not available")]
    CaptainUnavailable,

    #[error("No route found between pickup and destination")]
    RouteUnavailable,

    #[error("Upstream unavailable: {0}")]
    Upstream(String),
}

impl RideError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RideError::Validation(_) | RideError::InvalidOtp => ErrorKind::Validation,
            RideError::NotFound(_) => ErrorKind::NotFound,
            RideError::Unauthorized(_) => ErrorKind::Unauthorized,
            RideError::InvalidTransition { .. }
            | RideError::NotCancellable
            | RideError::AlreadyRated => ErrorKind::InvalidTransition,
            RideError::ActiveRideExists
            | RideError::RideNotAvailable
            | RideError::CaptainUnavailable => ErrorKind::Conflict,
            RideError::RouteUnavailable | RideError::Upstream(_) => {
                ErrorKind::UpstreamUnavailable
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RideError::Validation(_) => "VALIDATION_ERROR",
            RideError::NotFound(_) => "NOT_FOUND",
            RideError::Unauthorized(_) => "UNAUTHORIZED",
            RideError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RideError::NotCancellable => "NOT_CANCELLABLE",
            RideError::AlreadyRated => "ALREADY_RATED",
            RideError::InvalidOtp => "INVALID_OTP",
            RideError::ActiveRideExists => "ACTIVE_RIDE_EXISTS",
            RideError::RideNotAvailable => "RIDE_NOT_AVAILABLE",
            RideError::CaptainUnavailable => "CAPTAIN_UNAVAILABLE",
            RideError::RouteUnavailable => "ROUTE_UNAVAILABLE",
            RideError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl From<StoreError> for RideError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ActiveRideLimit => RideError::ActiveRideExists,
            other => RideError::Upstream(other.to_string()),
        }
    }
}

impl From<GeocodingError> for RideError {
    fn from(err: GeocodingError) -> Self {
        match err {
            GeocodingError::NotFound(_) => RideError::RouteUnavailable,
            GeocodingError::InvalidInput(msg) => RideError::Validation(msg),
            GeocodingError::Timeout => RideError::Upstream("geocoding timed out".to_string()),
            GeocodingError::Upstream(msg) => RideError::Upstream(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_twice_is_a_transition_error() {
        assert_eq!(RideError::AlreadyRated.kind(), ErrorKind::InvalidTransition);
        assert_eq!(RideError::NotCancellable.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_store_errors_become_upstream() {
        let err: RideError = StoreError::Database("connection reset".to_string()).into();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");

        let err: RideError = StoreError::ActiveRideLimit.into();
        assert_eq!(err.code(), "ACTIVE_RIDE_EXISTS");
    }

    #[test]
    fn test_missing_route_is_route_unavailable() {
        let err: RideError = GeocodingError::NotFound("route".to_string()).into();
        assert_eq!(err.code(), "ROUTE_UNAVAILABLE");
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }
}
