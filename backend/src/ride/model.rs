//! Ride record and its embedded value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GeoPoint, PartyRole, Place, Vehicle, VehicleType};
use crate::store::NearbyCaptain;

/// Ride status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "ride_status", rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Confirmed,
    Started,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub const ACTIVE: [RideStatus; 3] = [
        RideStatus::Pending,
        RideStatus::Confirmed,
        RideStatus::Started,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        matches!(
            (self, next),
            (RideStatus::Pending, RideStatus::Confirmed)
                | (RideStatus::Confirmed, RideStatus::Started)
                | (RideStatus::Started, RideStatus::Completed)
                | (RideStatus::Pending, RideStatus::Cancelled)
                | (RideStatus::Confirmed, RideStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "PENDING",
            RideStatus::Confirmed => "CONFIRMED",
            RideStatus::Started => "STARTED",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

/// How a fare amount was put together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base: f64,
    pub distance: f64,
    pub time: f64,
    pub surge_multiplier: f64,
    pub minimum_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub amount: f64,
    pub currency: String,
    pub breakdown: FareBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureUnit {
    Meters,
    Seconds,
}

/// A distance or duration with its display text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub value: f64,
    pub unit: MeasureUnit,
    pub text: String,
}

impl Measure {
    pub fn meters(value: f64) -> Self {
        let text = if value >= 1000.0 {
            format!("{:.1} km", value / 1000.0)
        } else {
            format!("{} m", value.round() as i64)
        };
        Self {
            value,
            unit: MeasureUnit::Meters,
            text,
        }
    }

    pub fn seconds(value: f64) -> Self {
        let minutes = (value / 60.0).round().max(1.0) as i64;
        let text = if minutes >= 60 {
            format!("{} hour {} mins", minutes / 60, minutes % 60)
        } else {
            format!("{} mins", minutes)
        };
        Self {
            value,
            unit: MeasureUnit::Seconds,
            text,
        }
    }
}

/// Distance and duration of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub distance: Measure,
    pub duration: Measure,
}

impl RouteMetrics {
    pub fn distance_km(&self) -> f64 {
        self.distance.value / 1000.0
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration.value / 60.0
    }
}

/// Ride start code handed to the rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Otp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub value: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    ChangedPlans,
    DriverTooFar,
    WaitTooLong,
    WrongPickup,
    RiderNoShow,
    VehicleIssue,
    Other,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::ChangedPlans => "CHANGED_PLANS",
            CancellationReason::DriverTooFar => "DRIVER_TOO_FAR",
            CancellationReason::WaitTooLong => "WAIT_TOO_LONG",
            CancellationReason::WrongPickup => "WRONG_PICKUP",
            CancellationReason::RiderNoShow => "RIDER_NO_SHOW",
            CancellationReason::VehicleIssue => "VEHICLE_ISSUE",
            CancellationReason::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelledBy {
    Rider,
    Captain,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancellationReason,
    pub comment: Option<String>,
    pub cancelled_by: CancelledBy,
    pub cancelled_at: DateTime<Utc>,
}

/// Live trip timestamps and captain position.
///
/// Used both as the stored value and as a patch: only `Some` fields are
/// written when merging, so a patch serializes to just the keys it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tracking {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_location_updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_departure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_arrival: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_completion: Option<DateTime<Utc>>,
}

impl Tracking {
    pub fn merge(&mut self, patch: &Tracking) {
        if patch.captain_location.is_some() {
            self.captain_location = patch.captain_location;
        }
        if patch.captain_location_updated_at.is_some() {
            self.captain_location_updated_at = patch.captain_location_updated_at;
        }
        if patch.estimated_arrival.is_some() {
            self.estimated_arrival = patch.estimated_arrival;
        }
        if patch.actual_departure.is_some() {
            self.actual_departure = patch.actual_departure;
        }
        if patch.actual_arrival.is_some() {
            self.actual_arrival = patch.actual_arrival;
        }
        if patch.actual_completion.is_some() {
            self.actual_completion = patch.actual_completion;
        }
    }
}

/// Which rating slot a party writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingSlot {
    /// Written by the rider, rates the captain
    ByRider,
    /// Written by the captain, rates the rider
    ByCaptain,
}

impl RatingSlot {
    pub fn for_role(role: PartyRole) -> Self {
        match role {
            PartyRole::Rider => RatingSlot::ByRider,
            PartyRole::Captain => RatingSlot::ByCaptain,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            RatingSlot::ByRider => "rider_rating",
            RatingSlot::ByCaptain => "captain_rating",
        }
    }
}

/// A ride request and everything that happens to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub captain_id: Option<Uuid>,
    pub pickup: Place,
    pub destination: Place,
    pub vehicle_type: VehicleType,
    pub status: RideStatus,
    pub fare: Fare,
    pub distance: Measure,
    pub duration: Measure,
    #[serde(skip_serializing)]
    pub otp: Otp,
    pub rider_rating: Option<Rating>,
    pub captain_rating: Option<Rating>,
    pub cancellation: Option<Cancellation>,
    pub tracking: Tracking,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn rating(&self, slot: RatingSlot) -> Option<&Rating> {
        match slot {
            RatingSlot::ByRider => self.rider_rating.as_ref(),
            RatingSlot::ByCaptain => self.captain_rating.as_ref(),
        }
    }

    pub fn rating_mut(&mut self, slot: RatingSlot) -> &mut Option<Rating> {
        match slot {
            RatingSlot::ByRider => &mut self.rider_rating,
            RatingSlot::ByCaptain => &mut self.captain_rating,
        }
    }

    /// The caller's role on this ride, if they have one.
    pub fn role_of(&self, party_id: Uuid) -> Option<PartyRole> {
        if self.rider_id == party_id {
            Some(PartyRole::Rider)
        } else if self.captain_id == Some(party_id) {
            Some(PartyRole::Captain)
        } else {
            None
        }
    }
}

/// Payment owed on completion; rides are settled in cash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub amount: f64,
    pub currency: String,
    pub method: String,
    pub status: String,
}

impl PaymentSummary {
    pub fn cash_due(fare: &Fare) -> Self {
        Self {
            amount: fare.amount,
            currency: fare.currency.clone(),
            method: "CASH".to_string(),
            status: "DUE".to_string(),
        }
    }
}

/// What the rider learns about the captain on confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptainSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub vehicle: Vehicle,
    pub rating: Option<f64>,
}

/// Captain notified about a new request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptainCandidate {
    pub captain_id: Uuid,
    pub name: String,
    pub vehicle: Vehicle,
    pub distance_meters: f64,
}

impl From<&NearbyCaptain> for CaptainCandidate {
    fn from(nearby: &NearbyCaptain) -> Self {
        Self {
            captain_id: nearby.captain.id,
            name: nearby.captain.full_name(),
            vehicle: nearby.captain.vehicle.clone(),
            distance_meters: nearby.distance_meters,
        }
    }
}

/// OTP as shown to the rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpView {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Otp> for OtpView {
    fn from(otp: &Otp) -> Self {
        Self {
            code: otp.code.clone(),
            expires_at: otp.expires_at,
        }
    }
}

/// Result of a successful create request
#[derive(Debug, Clone, Serialize)]
pub struct CreatedRide {
    pub ride: Ride,
    pub otp: OtpView,
    pub candidates: Vec<CaptainCandidate>,
}

/// Ride as returned to one of its parties; only the rider sees the OTP
#[derive(Debug, Clone, Serialize)]
pub struct RideView {
    #[serde(flatten)]
    pub ride: Ride,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpView>,
}

impl RideView {
    pub fn for_party(ride: Ride, viewer: PartyRole) -> Self {
        let otp = match viewer {
            PartyRole::Rider if !ride.otp.verified && ride.status.is_active() => {
                Some(OtpView::from(&ride.otp))
            }
            _ => None,
        };
        Self { ride, otp }
    }
}

/// Fare quote without a ride
#[derive(Debug, Clone, Serialize)]
pub struct FareEstimate {
    pub vehicle_type: VehicleType,
    pub fare: Fare,
    pub distance: Measure,
    pub duration: Measure,
}
