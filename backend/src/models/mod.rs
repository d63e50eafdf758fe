//! Data models shared across the ride-hailing backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

pub mod auth;
pub mod ride;
pub use auth::*;
pub use ride::*;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A named location: pickup or destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Place {
    #[validate(length(min = 1, max = 500))]
    pub address: String,
    #[validate]
    pub location: GeoPoint,
}

/// Vehicle classes; each has its own fare table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "vehicle_type", rename_all = "lowercase")]
pub enum VehicleType {
    Standard,
    Comfort,
    Premium,
    Share,
}

impl VehicleType {
    pub const ALL: [VehicleType; 4] = [
        VehicleType::Standard,
        VehicleType::Comfort,
        VehicleType::Premium,
        VehicleType::Share,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Standard => "STANDARD",
            VehicleType::Comfort => "COMFORT",
            VehicleType::Premium => "PREMIUM",
            VehicleType::Share => "SHARE",
        }
    }
}

/// Which side of the marketplace an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "party_role", rename_all = "lowercase")]
pub enum PartyRole {
    Rider,
    Captain,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Rider => "rider",
            PartyRole::Captain => "captain",
        }
    }
}

/// Rider account
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Rider {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub rating: Option<f64>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Captain availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "captain_status", rename_all = "lowercase")]
pub enum CaptainStatus {
    Available,
    Busy,
    Inactive,
    Banned,
}

/// Captain's registered vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vehicle {
    pub vehicle_type: VehicleType,
    #[sqlx(rename = "vehicle_model")]
    pub model: String,
    #[sqlx(rename = "vehicle_plate")]
    pub plate: String,
    #[sqlx(rename = "vehicle_color")]
    pub color: String,
    #[sqlx(rename = "vehicle_capacity")]
    pub capacity: i32,
    #[sqlx(rename = "vehicle_year")]
    pub year: i32,
}

/// Captain (driver) account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Captain {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    #[sqlx(flatten)]
    pub vehicle: Vehicle,
    pub status: CaptainStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Captain {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

/// Public rider profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Rider> for RiderResponse {
    fn from(rider: Rider) -> Self {
        Self {
            id: rider.id,
            first_name: rider.first_name,
            last_name: rider.last_name,
            email: rider.email,
            phone: rider.phone,
            rating: rider.rating,
            created_at: rider.created_at,
        }
    }
}

/// Public captain profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptainResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub vehicle: Vehicle,
    pub status: CaptainStatus,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Captain> for CaptainResponse {
    fn from(captain: Captain) -> Self {
        let location = captain.location();
        Self {
            id: captain.id,
            first_name: captain.first_name,
            last_name: captain.last_name,
            email: captain.email,
            phone: captain.phone,
            vehicle: captain.vehicle,
            status: captain.status,
            location,
            location_updated_at: captain.location_updated_at,
            rating: captain.rating,
            created_at: captain.created_at,
        }
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationParams {
    pub const MAX_LIMIT: i64 = 100;

    /// `(page, limit)` with page >= 1 and limit in 1..=100.
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT);
        (page, limit)
    }
}

/// Paginated response
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(12.9, 77.5).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.1).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_haversine_distance() {
        let a = GeoPoint::new(12.9, 77.5);
        let b = GeoPoint::new(12.95, 77.6);
        let d = a.distance_meters(&b);
        // Roughly 12 km apart
        assert!(d > 11_000.0 && d < 13_000.0, "got {}", d);
        assert_eq!(a.distance_meters(&a), 0.0);
    }

    #[test]
    fn test_pagination_clamps() {
        let params = PaginationParams {
            page: Some(0),
            limit: Some(500),
        };
        assert_eq!(params.normalized(), (1, 100));

        let params = PaginationParams {
            page: None,
            limit: Some(0),
        };
        assert_eq!(params.normalized(), (1, 1));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&VehicleType::Premium).unwrap(),
            "\"PREMIUM\""
        );
        assert_eq!(
            serde_json::to_string(&CaptainStatus::Available).unwrap(),
            "\"AVAILABLE\""
        );
        assert_eq!(serde_json::to_string(&PartyRole::Captain).unwrap(), "\"captain\"");
    }
}
