//! Ride lifecycle engine
//!
//! Every state change is a guarded write against the store: the ride only
//! moves if it is still in the status this service observed. A write that
//! loses the race is re-read to report why.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::error::RideError;
use super::fare::FareCalculator;
use super::model::{
    Cancellation, CancellationReason, CancelledBy, CaptainCandidate, CaptainSummary, CreatedRide,
    FareEstimate, OtpView, PaymentSummary, Rating, RatingSlot, Ride, RideStatus, RideView,
    RouteMetrics, Tracking,
};
use super::otp;
use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::models::{CaptainStatus, GeoPoint, PartyRole, Place, VehicleType};
use crate::notification::{NotificationService, RideEvent};
use crate::store::{
    AssignOutcome, Page, PartyStore, RideQuery, RideStore, StoreError, Transition,
};

const MAX_TEXT_LEN: usize = 500;
const CANCEL_ATTEMPTS: usize = 3;

/// Tunables for dispatch and the ride lifecycle
#[derive(Debug, Clone)]
pub struct RidePolicy {
    pub search_radius_meters: f64,
    pub max_candidates: usize,
    pub otp_ttl: Duration,
    pub estimated_arrival: Duration,
    pub max_active_rides: u32,
    pub geocoding_timeout: StdDuration,
}

impl Default for RidePolicy {
    fn default() -> Self {
        Self {
            search_radius_meters: 5000.0,
            max_candidates: 10,
            otp_ttl: Duration::minutes(10),
            estimated_arrival: Duration::minutes(15),
            max_active_rides: 1,
            geocoding_timeout: StdDuration::from_millis(5000),
        }
    }
}

impl RidePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search_radius_meters: config.dispatch_radius_meters,
            max_candidates: config.dispatch_max_candidates,
            otp_ttl: Duration::minutes(config.otp_ttl_minutes),
            estimated_arrival: Duration::minutes(config.estimated_arrival_minutes),
            max_active_rides: config.max_active_rides.max(1),
            geocoding_timeout: StdDuration::from_millis(config.geocoding_timeout_ms),
        }
    }
}

pub struct RideService {
    rides: Arc<dyn RideStore>,
    parties: Arc<dyn PartyStore>,
    geocoder: Arc<dyn Geocoder>,
    notifier: Arc<NotificationService>,
    fares: FareCalculator,
    policy: RidePolicy,
}

impl RideService {
    pub fn new(
        rides: Arc<dyn RideStore>,
        parties: Arc<dyn PartyStore>,
        geocoder: Arc<dyn Geocoder>,
        notifier: Arc<NotificationService>,
        fares: FareCalculator,
        policy: RidePolicy,
    ) -> Self {
        Self {
            rides,
            parties,
            geocoder,
            notifier,
            fares,
            policy,
        }
    }

    /// Request a ride and fan the request out to nearby available captains.
    pub async fn create_ride(
        &self,
        rider_id: Uuid,
        pickup: Place,
        destination: Place,
        vehicle_type: VehicleType,
    ) -> Result<CreatedRide, RideError> {
        validate_place("pickup", &pickup)?;
        validate_place("destination", &destination)?;

        self.parties
            .rider_by_id(rider_id)
            .await?
            .filter(|rider| !rider.deleted)
            .ok_or(RideError::NotFound("Rider"))?;

        // Fast path; the insert re-checks atomically.
        let active = self.rides.count_active_rides(rider_id).await?;
        if active >= i64::from(self.policy.max_active_rides) {
            return Err(RideError::ActiveRideExists);
        }

        let route = self
            .route_metrics(pickup.location, destination.location)
            .await?;
        let fare = self
            .fares
            .fare(route.distance_km(), route.duration_minutes(), vehicle_type);

        let now = Utc::now();
        let ride = Ride {
            id: Uuid::new_v4(),
            rider_id,
            captain_id: None,
            pickup,
            destination,
            vehicle_type,
            status: RideStatus::Pending,
            fare,
            distance: route.distance,
            duration: route.duration,
            otp: otp::generate(now, self.policy.otp_ttl),
            rider_rating: None,
            captain_rating: None,
            cancellation: None,
            tracking: Tracking::default(),
            created_at: now,
            updated_at: now,
        };
        self.rides
            .insert_ride(&ride, self.policy.max_active_rides)
            .await?;

        tracing::info!(
            ride_id = %ride.id,
            rider_id = %rider_id,
            vehicle_type = vehicle_type.as_str(),
            fare = ride.fare.amount,
            "Ride requested"
        );

        let nearby = match self
            .parties
            .nearby_captains(
                ride.pickup.location,
                self.policy.search_radius_meters,
                self.policy.max_candidates,
            )
            .await
        {
            Ok(nearby) => nearby,
            Err(e) => {
                tracing::warn!(ride_id = %ride.id, error = %e, "Captain lookup failed");
                Vec::new()
            }
        };

        for candidate in &nearby {
            let event = RideEvent::NewRideRequest {
                ride_id: ride.id,
                pickup: ride.pickup.clone(),
                destination: ride.destination.clone(),
                vehicle_type: ride.vehicle_type,
                fare: ride.fare.clone(),
                distance_meters: candidate.distance_meters,
            };
            self.notify(candidate.captain.id, PartyRole::Captain, &event)
                .await;
        }

        if nearby.is_empty() {
            tracing::info!(ride_id = %ride.id, "No available captains near pickup");
        }

        Ok(CreatedRide {
            otp: OtpView::from(&ride.otp),
            candidates: nearby.iter().map(CaptainCandidate::from).collect(),
            ride,
        })
    }

    pub async fn accept_ride(&self, ride_id: Uuid, captain_id: Uuid) -> Result<Ride, RideError> {
        let ride = self.load(ride_id).await?;
        let captain = self
            .parties
            .captain_by_id(captain_id)
            .await?
            .ok_or(RideError::NotFound("Captain"))?;

        if ride.status != RideStatus::Pending {
            return Err(RideError::RideNotAvailable);
        }
        if captain.status != CaptainStatus::Available {
            return Err(RideError::CaptainUnavailable);
        }

        let tracking = Tracking {
            estimated_arrival: Some(Utc::now() + self.policy.estimated_arrival),
            ..Default::default()
        };
        let ride = match self
            .rides
            .assign_captain(ride_id, captain_id, &tracking)
            .await?
        {
            AssignOutcome::Assigned(ride) => ride,
            AssignOutcome::RideNotPending => return Err(RideError::RideNotAvailable),
            AssignOutcome::CaptainNotAvailable => return Err(RideError::CaptainUnavailable),
        };

        tracing::info!(ride_id = %ride_id, captain_id = %captain_id, "Ride accepted");

        let event = RideEvent::RideConfirmed {
            ride_id,
            captain: CaptainSummary {
                id: captain.id,
                name: captain.full_name(),
                phone: captain.phone.clone(),
                vehicle: captain.vehicle.clone(),
                rating: captain.rating,
            },
            estimated_arrival: ride.tracking.estimated_arrival,
        };
        self.notify(ride.rider_id, PartyRole::Rider, &event).await;

        Ok(ride)
    }

    /// Captain starts the trip with the rider's OTP.
    pub async fn start_ride(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        code: &str,
    ) -> Result<Ride, RideError> {
        let ride = self.load(ride_id).await?;
        ensure_captain(&ride, captain_id)?;
        ensure_status(&ride, RideStatus::Confirmed, "start ride")?;

        let now = Utc::now();
        if !otp::verify(&ride.otp, code, now) {
            tracing::debug!(ride_id = %ride_id, "OTP rejected");
            return Err(RideError::InvalidOtp);
        }

        let change = Transition {
            expected_captain: Some(captain_id),
            tracking: Tracking {
                actual_departure: Some(now),
                ..Default::default()
            },
            verify_otp: true,
            ..Transition::new(RideStatus::Confirmed, RideStatus::Started)
        };
        let ride = match self.rides.transition(ride_id, &change).await? {
            Some(ride) => ride,
            None => return Err(self.lost_race(ride_id, "start ride").await),
        };

        tracing::info!(ride_id = %ride_id, captain_id = %captain_id, "Ride started");

        let event = RideEvent::RideStarted {
            ride_id,
            started_at: now,
        };
        self.notify(ride.rider_id, PartyRole::Rider, &event).await;

        Ok(ride)
    }

    pub async fn complete_ride(&self, ride_id: Uuid, captain_id: Uuid) -> Result<Ride, RideError> {
        let ride = self.load(ride_id).await?;
        ensure_captain(&ride, captain_id)?;
        ensure_status(&ride, RideStatus::Started, "complete ride")?;

        let now = Utc::now();
        let change = Transition {
            expected_captain: Some(captain_id),
            tracking: Tracking {
                actual_arrival: Some(now),
                actual_completion: Some(now),
                ..Default::default()
            },
            release_captain: Some(captain_id),
            ..Transition::new(RideStatus::Started, RideStatus::Completed)
        };
        let ride = match self.rides.transition(ride_id, &change).await? {
            Some(ride) => ride,
            None => return Err(self.lost_race(ride_id, "complete ride").await),
        };

        tracing::info!(
            ride_id = %ride_id,
            captain_id = %captain_id,
            fare = ride.fare.amount,
            "Ride completed"
        );

        let event = RideEvent::RideCompleted {
            ride_id,
            fare: ride.fare.clone(),
            payment: PaymentSummary::cash_due(&ride.fare),
            completed_at: now,
        };
        self.notify(ride.rider_id, PartyRole::Rider, &event).await;

        Ok(ride)
    }

    /// Rider or assigned captain cancels a ride that has not started.
    pub async fn cancel_ride(
        &self,
        ride_id: Uuid,
        actor_id: Uuid,
        reason: CancellationReason,
        comment: Option<String>,
    ) -> Result<Ride, RideError> {
        let comment = normalize_comment(comment)?;

        for _ in 0..CANCEL_ATTEMPTS {
            let ride = self.load(ride_id).await?;
            let role = ride.role_of(actor_id).ok_or_else(|| {
                RideError::Unauthorized("only the rider or assigned captain may cancel".to_string())
            })?;
            if !matches!(ride.status, RideStatus::Pending | RideStatus::Confirmed) {
                return Err(RideError::NotCancellable);
            }

            let cancelled_by = match role {
                PartyRole::Rider => CancelledBy::Rider,
                PartyRole::Captain => CancelledBy::Captain,
            };
            let change = Transition {
                expected_captain: ride.captain_id,
                cancellation: Some(Cancellation {
                    reason,
                    comment: comment.clone(),
                    cancelled_by,
                    cancelled_at: Utc::now(),
                }),
                release_captain: ride.captain_id,
                ..Transition::new(ride.status, RideStatus::Cancelled)
            };

            // A miss means the ride moved on (usually PENDING -> CONFIRMED); re-check.
            let Some(cancelled) = self.rides.transition(ride_id, &change).await? else {
                continue;
            };

            tracing::info!(
                ride_id = %ride_id,
                cancelled_by = ?cancelled_by,
                reason = reason.as_str(),
                "Ride cancelled"
            );

            let event = RideEvent::RideCancelled {
                ride_id,
                reason,
                comment: comment.clone(),
                cancelled_by,
            };
            match (role, cancelled.captain_id) {
                (PartyRole::Rider, Some(captain_id)) => {
                    self.notify(captain_id, PartyRole::Captain, &event).await
                }
                (PartyRole::Captain, _) => {
                    self.notify(cancelled.rider_id, PartyRole::Rider, &event)
                        .await
                }
                (PartyRole::Rider, None) => {}
            }

            return Ok(cancelled);
        }

        Err(RideError::RideNotAvailable)
    }

    /// Rate the other party of a completed ride. `as_captain` selects which
    /// slot the actor writes.
    pub async fn rate_ride(
        &self,
        ride_id: Uuid,
        actor_id: Uuid,
        rating: i32,
        comment: Option<String>,
        as_captain: bool,
    ) -> Result<Ride, RideError> {
        if !(1..=5).contains(&rating) {
            return Err(RideError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        let comment = normalize_comment(comment)?;

        let ride = self.load(ride_id).await?;
        ensure_status(&ride, RideStatus::Completed, "rate ride")?;

        let role = if as_captain {
            PartyRole::Captain
        } else {
            PartyRole::Rider
        };
        let (rated_id, rated_role) = match role {
            PartyRole::Rider if ride.rider_id == actor_id => {
                let captain_id = ride.captain_id.ok_or_else(|| {
                    StoreError::Corrupt(format!("completed ride {} has no captain", ride_id))
                })?;
                (captain_id, PartyRole::Captain)
            }
            PartyRole::Captain if ride.captain_id == Some(actor_id) => {
                (ride.rider_id, PartyRole::Rider)
            }
            _ => {
                return Err(RideError::Unauthorized(format!(
                    "only the ride's {} may leave this rating",
                    role.as_str()
                )))
            }
        };

        let slot = RatingSlot::for_role(role);
        if ride.rating(slot).is_some() {
            return Err(RideError::AlreadyRated);
        }

        let value = rating as u8;
        let entry = Rating {
            value,
            comment: comment.clone(),
            created_at: Utc::now(),
        };
        let ride = match self.rides.record_rating(ride_id, slot, &entry).await? {
            Some(ride) => ride,
            None => {
                // Lost to a concurrent rating of the same slot.
                return match self.rides.get_ride(ride_id).await? {
                    Some(current) if current.rating(slot).is_some() => Err(RideError::AlreadyRated),
                    Some(current) => Err(RideError::InvalidTransition {
                        action: "rate ride",
                        status: current.status.as_str(),
                    }),
                    None => Err(RideError::NotFound("Ride")),
                };
            }
        };

        tracing::info!(
            ride_id = %ride_id,
            rated_by = role.as_str(),
            rating = value,
            "Ride rated"
        );

        self.refresh_average(slot, rated_id, rated_role).await;

        let event = RideEvent::RideRated {
            ride_id,
            rating: value,
            comment,
            rated_by: role,
        };
        self.notify(rated_id, rated_role, &event).await;

        Ok(ride)
    }

    /// Live position from the assigned captain during pickup or the trip.
    pub async fn update_captain_location(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        location: GeoPoint,
    ) -> Result<Ride, RideError> {
        if !location.is_valid() {
            return Err(RideError::Validation("invalid coordinates".to_string()));
        }

        let ride = self.load(ride_id).await?;
        ensure_captain(&ride, captain_id)?;
        if !matches!(ride.status, RideStatus::Confirmed | RideStatus::Started) {
            return Err(RideError::InvalidTransition {
                action: "update location",
                status: ride.status.as_str(),
            });
        }

        let now = Utc::now();
        let ride = match self
            .rides
            .record_captain_location(ride_id, captain_id, location, now)
            .await?
        {
            Some(ride) => ride,
            None => return Err(self.lost_race(ride_id, "update location").await),
        };

        tracing::trace!(ride_id = %ride_id, lat = location.lat, lng = location.lng, "Captain moved");

        let event = RideEvent::CaptainLocationUpdate {
            ride_id,
            location,
            updated_at: now,
        };
        self.notify(ride.rider_id, PartyRole::Rider, &event).await;

        Ok(ride)
    }

    /// A ride as seen by one of its parties.
    pub async fn get_ride(&self, ride_id: Uuid, actor_id: Uuid) -> Result<RideView, RideError> {
        let ride = self.load(ride_id).await?;
        let role = ride
            .role_of(actor_id)
            .ok_or_else(|| RideError::Unauthorized("not a party to this ride".to_string()))?;
        Ok(RideView::for_party(ride, role))
    }

    pub async fn rider_history(
        &self,
        rider_id: Uuid,
        status: Option<RideStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<RideView>, RideError> {
        self.history(PartyRole::Rider, rider_id, status, page, limit)
            .await
    }

    pub async fn captain_history(
        &self,
        captain_id: Uuid,
        status: Option<RideStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<RideView>, RideError> {
        self.history(PartyRole::Captain, captain_id, status, page, limit)
            .await
    }

    pub async fn rider_active_ride(&self, rider_id: Uuid) -> Result<Option<RideView>, RideError> {
        self.active_ride(PartyRole::Rider, rider_id).await
    }

    pub async fn captain_active_ride(
        &self,
        captain_id: Uuid,
    ) -> Result<Option<RideView>, RideError> {
        self.active_ride(PartyRole::Captain, captain_id).await
    }

    /// Quote every vehicle class (or just one) for a route without booking.
    pub async fn estimate_fare(
        &self,
        pickup: GeoPoint,
        destination: GeoPoint,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Vec<FareEstimate>, RideError> {
        if !pickup.is_valid() || !destination.is_valid() {
            return Err(RideError::Validation("invalid coordinates".to_string()));
        }

        let route = self.route_metrics(pickup, destination).await?;
        let classes = match vehicle_type {
            Some(vehicle_type) => vec![vehicle_type],
            None => VehicleType::ALL.to_vec(),
        };

        Ok(classes
            .into_iter()
            .map(|vehicle_type| FareEstimate {
                vehicle_type,
                fare: self.fares.fare(
                    route.distance_km(),
                    route.duration_minutes(),
                    vehicle_type,
                ),
                distance: route.distance.clone(),
                duration: route.duration.clone(),
            })
            .collect())
    }

    async fn history(
        &self,
        role: PartyRole,
        party_id: Uuid,
        status: Option<RideStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<RideView>, RideError> {
        let query = RideQuery {
            party_id,
            role,
            status,
            page: page.max(1),
            limit: limit.clamp(1, 100),
        };
        let page = self.rides.list_rides(&query).await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|ride| RideView::for_party(ride, role))
                .collect(),
            total: page.total,
        })
    }

    async fn active_ride(
        &self,
        role: PartyRole,
        party_id: Uuid,
    ) -> Result<Option<RideView>, RideError> {
        let ride = self.rides.active_ride_for(role, party_id).await?;
        Ok(ride.map(|ride| RideView::for_party(ride, role)))
    }

    async fn load(&self, ride_id: Uuid) -> Result<Ride, RideError> {
        self.rides
            .get_ride(ride_id)
            .await?
            .ok_or(RideError::NotFound("Ride"))
    }

    async fn route_metrics(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteMetrics, RideError> {
        match tokio::time::timeout(
            self.policy.geocoding_timeout,
            self.geocoder.route_metrics(origin, destination),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.policy.geocoding_timeout.as_millis() as u64,
                    "Route lookup timed out"
                );
                Err(RideError::Upstream("route lookup timed out".to_string()))
            }
        }
    }

    /// Explain a guarded write that matched nothing.
    async fn lost_race(&self, ride_id: Uuid, action: &'static str) -> RideError {
        match self.rides.get_ride(ride_id).await {
            Ok(Some(ride)) => RideError::InvalidTransition {
                action,
                status: ride.status.as_str(),
            },
            Ok(None) => RideError::NotFound("Ride"),
            Err(e) => e.into(),
        }
    }

    async fn refresh_average(&self, slot: RatingSlot, party_id: Uuid, role: PartyRole) {
        let result = match self.rides.average_rating(slot, party_id).await {
            Ok(average) => match role {
                PartyRole::Captain => self.parties.set_captain_rating(party_id, average).await,
                PartyRole::Rider => self.parties.set_rider_rating(party_id, average).await,
            },
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(party_id = %party_id, error = %e, "Failed to refresh average rating");
        }
    }

    /// Log failures are reported but never undo a committed transition.
    async fn notify(&self, party_id: Uuid, role: PartyRole, event: &RideEvent) {
        if let Err(e) = self.notifier.notify(party_id, role, event).await {
            tracing::warn!(
                party_id = %party_id,
                event_type = event.event_type(),
                error = %e,
                "Failed to record notification"
            );
        }
    }
}

fn validate_place(field: &str, place: &Place) -> Result<(), RideError> {
    if place.address.trim().is_empty() {
        return Err(RideError::Validation(format!("{} address is required", field)));
    }
    if place.address.len() > MAX_TEXT_LEN {
        return Err(RideError::Validation(format!("{} address is too long", field)));
    }
    if !place.location.is_valid() {
        return Err(RideError::Validation(format!(
            "{} coordinates are out of range",
            field
        )));
    }
    Ok(())
}

fn normalize_comment(comment: Option<String>) -> Result<Option<String>, RideError> {
    let comment = comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_TEXT_LEN) {
        return Err(RideError::Validation("comment is too long".to_string()));
    }
    Ok(comment)
}

fn ensure_captain(ride: &Ride, captain_id: Uuid) -> Result<(), RideError> {
    if ride.captain_id == Some(captain_id) {
        Ok(())
    } else {
        Err(RideError::Unauthorized(
            "ride is not assigned to this captain".to_string(),
        ))
    }
}

fn ensure_status(ride: &Ride, expected: RideStatus, action: &'static str) -> Result<(), RideError> {
    if ride.status == expected {
        Ok(())
    } else {
        Err(RideError::InvalidTransition {
            action,
            status: ride.status.as_str(),
        })
    }
}
