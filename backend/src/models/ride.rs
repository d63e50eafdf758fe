//! Request bodies and query strings for rides, captains, notifications and maps

use serde::Deserialize;
use validator::Validate;

use super::{CaptainStatus, GeoPoint, PaginationParams, Place, VehicleType};
use crate::ride::{CancellationReason, RideStatus};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    #[validate]
    pub pickup: Place,
    #[validate]
    pub destination: Place,
    pub vehicle_type: VehicleType,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EstimateFareRequest {
    #[validate]
    pub pickup: GeoPoint,
    #[validate]
    pub destination: GeoPoint,
    /// All classes when omitted
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartRideRequest {
    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRideRequest {
    pub reason: CancellationReason,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RateRideRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LocationRequest {
    #[validate]
    pub location: GeoPoint,
}

#[derive(Debug, Deserialize)]
pub struct CaptainStatusRequest {
    pub status: CaptainStatus,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<RideStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CoordinatesQuery {
    #[validate(length(min = 3, message = "Address must be at least 3 characters"))]
    pub address: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DistanceTimeQuery {
    #[validate(length(min = 3))]
    pub origin: String,
    #[validate(length(min = 3))]
    pub destination: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AutocompleteQuery {
    #[validate(length(min = 3, message = "Input must be at least 3 characters"))]
    pub input: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ride_rejects_bad_coordinates() {
        let request: CreateRideRequest = serde_json::from_value(serde_json::json!({
            "pickup": { "address": "MG Road", "location": { "lat": 95.0, "lng": 77.6 } },
            "destination": { "address": "Indiranagar", "location": { "lat": 12.97, "lng": 77.64 } },
            "vehicle_type": "STANDARD"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_rating_range() {
        let ok = RateRideRequest {
            rating: 5,
            comment: None,
        };
        assert!(ok.validate().is_ok());

        let too_high = RateRideRequest {
            rating: 6,
            comment: None,
        };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn test_short_autocomplete_input() {
        let query = AutocompleteQuery {
            input: "ab".to_string(),
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_history_status_filter_parses() {
        let query: HistoryQuery =
            serde_json::from_value(serde_json::json!({ "status": "COMPLETED", "page": 2 }))
                .unwrap();
        assert_eq!(query.status, Some(RideStatus::Completed));
        assert_eq!(query.pagination().normalized(), (2, 10));
    }
}
