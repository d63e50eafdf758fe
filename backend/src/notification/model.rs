use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GeoPoint, PartyRole, Place, VehicleType};
use crate::ride::{
    CancellationReason, CancelledBy, CaptainSummary, Fare, PaymentSummary,
};

/// Stored notification log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub party_id: Uuid,
    pub party_role: PartyRole,
    pub event_type: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Ride lifecycle events pushed to riders and captains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideEvent {
    NewRideRequest {
        ride_id: Uuid,
        pickup: Place,
        destination: Place,
        vehicle_type: VehicleType,
        fare: Fare,
        distance_meters: f64,
    },
    RideConfirmed {
        ride_id: Uuid,
        captain: CaptainSummary,
        estimated_arrival: Option<DateTime<Utc>>,
    },
    RideStarted {
        ride_id: Uuid,
        started_at: DateTime<Utc>,
    },
    RideCompleted {
        ride_id: Uuid,
        fare: Fare,
        payment: PaymentSummary,
        completed_at: DateTime<Utc>,
    },
    RideCancelled {
        ride_id: Uuid,
        reason: CancellationReason,
        comment: Option<String>,
        cancelled_by: CancelledBy,
    },
    RideRated {
        ride_id: Uuid,
        rating: u8,
        comment: Option<String>,
        rated_by: PartyRole,
    },
    CaptainLocationUpdate {
        ride_id: Uuid,
        location: GeoPoint,
        updated_at: DateTime<Utc>,
    },
}

impl RideEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RideEvent::NewRideRequest { .. } => "NEW_RIDE_REQUEST",
            RideEvent::RideConfirmed { .. } => "RIDE_CONFIRMED",
            RideEvent::RideStarted { .. } => "RIDE_STARTED",
            RideEvent::RideCompleted { .. } => "RIDE_COMPLETED",
            RideEvent::RideCancelled { .. } => "RIDE_CANCELLED",
            RideEvent::RideRated { .. } => "RIDE_RATED",
            RideEvent::CaptainLocationUpdate { .. } => "CAPTAIN_LOCATION_UPDATE",
        }
    }

    pub fn ride_id(&self) -> Uuid {
        match self {
            RideEvent::NewRideRequest { ride_id, .. }
            | RideEvent::RideConfirmed { ride_id, .. }
            | RideEvent::RideStarted { ride_id, .. }
            | RideEvent::RideCompleted { ride_id, .. }
            | RideEvent::RideCancelled { ride_id, .. }
            | RideEvent::RideRated { ride_id, .. }
            | RideEvent::CaptainLocationUpdate { ride_id, .. } => *ride_id,
        }
    }

    /// Human-readable text, worded for the receiving side.
    pub fn message_for(&self, recipient: PartyRole) -> String {
        match (recipient, self) {
            (PartyRole::Captain, RideEvent::NewRideRequest { pickup, fare, .. }) => format!(
                "New ride request! Pickup: {}, Fare: {}",
                pickup.address,
                format_money(fare.amount, &fare.currency)
            ),
            (PartyRole::Rider, RideEvent::RideConfirmed { captain, .. }) => format!(
                "Your ride has been confirmed! Captain {} is on the way.",
                captain.name
            ),
            (PartyRole::Rider, RideEvent::RideStarted { .. }) => {
                "Your ride has started! Enjoy your trip.".to_string()
            }
            (PartyRole::Rider, RideEvent::RideCompleted { fare, .. }) => format!(
                "Your ride has been completed. Fare: {}",
                format_money(fare.amount, &fare.currency)
            ),
            (PartyRole::Rider, RideEvent::RideCancelled { reason, .. }) => format!(
                "Your ride has been cancelled. Reason: {}",
                reason.as_str()
            ),
            (PartyRole::Captain, RideEvent::RideCancelled { reason, .. }) => {
                format!("Ride cancelled. Reason: {}", reason.as_str())
            }
            (PartyRole::Rider, RideEvent::CaptainLocationUpdate { .. }) => {
                "Captain location has been updated.".to_string()
            }
            (_, RideEvent::RideRated { rating, .. }) => {
                format!("You received a {}-star rating for your ride.", rating)
            }
            _ => "You have a new notification.".to_string(),
        }
    }
}

fn format_money(amount: f64, currency: &str) -> String {
    let value = if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{:.2}", amount)
    };
    match currency {
        "INR" => format!("₹{}", value),
        other => format!("{} {}", value, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Vehicle, VehicleType};
    use crate::ride::FareBreakdown;

    fn fare(amount: f64) -> Fare {
        Fare {
            amount,
            currency: "INR".to_string(),
            breakdown: FareBreakdown {
                base: 50.0,
                distance: 90.0,
                time: 36.0,
                surge_multiplier: 1.0,
                minimum_applied: false,
            },
        }
    }

    #[test]
    fn test_rider_messages() {
        let ride_id = Uuid::new_v4();
        let confirmed = RideEvent::RideConfirmed {
            ride_id,
            captain: CaptainSummary {
                id: Uuid::new_v4(),
                name: "Ravi Kumar".to_string(),
                phone: None,
                vehicle: Vehicle {
                    vehicle_type: VehicleType::Standard,
                    model: "Swift".to_string(),
                    plate: "KA01AB1234".to_string(),
                    color: "White".to_string(),
                    capacity: 4,
                    year: 2020,
                },
                rating: None,
            },
            estimated_arrival: None,
        };
        assert_eq!(
            confirmed.message_for(PartyRole::Rider),
            "Your ride has been confirmed! Captain Ravi Kumar is on the way."
        );

        let completed = RideEvent::RideCompleted {
            ride_id,
            fare: fare(176.0),
            payment: PaymentSummary::cash_due(&fare(176.0)),
            completed_at: Utc::now(),
        };
        assert_eq!(
            completed.message_for(PartyRole::Rider),
            "Your ride has been completed. Fare: ₹176"
        );
    }

    #[test]
    fn test_cancel_message_depends_on_recipient() {
        let event = RideEvent::RideCancelled {
            ride_id: Uuid::new_v4(),
            reason: CancellationReason::DriverTooFar,
            comment: None,
            cancelled_by: CancelledBy::Rider,
        };
        assert_eq!(
            event.message_for(PartyRole::Rider),
            "Your ride has been cancelled. Reason: DRIVER_TOO_FAR"
        );
        assert_eq!(
            event.message_for(PartyRole::Captain),
            "Ride cancelled. Reason: DRIVER_TOO_FAR"
        );
    }

    #[test]
    fn test_event_type_tag_matches_serialized_type() {
        let event = RideEvent::RideStarted {
            ride_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(
            event.message_for(PartyRole::Captain),
            "You have a new notification."
        );
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(176.0, "INR"), "₹176");
        assert_eq!(format_money(12.5, "USD"), "12.50 USD");
    }
}
