//! Persistence contracts
//!
//! Every ride mutation is a compare-and-set on the ride's current status.
//! Joint ride/captain changes are applied atomically by the implementation
//! (one transaction in PostgreSQL, one write lock in memory).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Captain, CaptainStatus, GeoPoint, PartyRole, Rider};
use crate::notification::Notification;
use crate::ride::{Cancellation, Rating, RatingSlot, Ride, RideStatus, Tracking};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Active ride limit reached")]
    ActiveRideLimit,

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Duplicate(db_err.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// One page of results plus the unpaged total
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// History query for one party
#[derive(Debug, Clone)]
pub struct RideQuery {
    pub party_id: Uuid,
    pub role: PartyRole,
    pub status: Option<RideStatus>,
    pub page: i64,
    pub limit: i64,
}

impl RideQuery {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

/// Outcome of the accept compare-and-set
#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned(Ride),
    RideNotPending,
    CaptainNotAvailable,
}

/// A status change guarded on the ride's current status
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: RideStatus,
    pub to: RideStatus,
    /// Only apply when the ride is assigned to this captain
    pub expected_captain: Option<Uuid>,
    pub tracking: Tracking,
    pub verify_otp: bool,
    pub cancellation: Option<Cancellation>,
    /// Captain flipped from BUSY back to AVAILABLE in the same write
    pub release_captain: Option<Uuid>,
}

impl Transition {
    pub fn new(from: RideStatus, to: RideStatus) -> Self {
        debug_assert!(
            from.can_transition_to(to),
            "illegal ride transition {} -> {}",
            from.as_str(),
            to.as_str()
        );
        Self {
            from,
            to,
            expected_captain: None,
            tracking: Tracking::default(),
            verify_otp: false,
            cancellation: None,
            release_captain: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NearbyCaptain {
    pub captain: Captain,
    pub distance_meters: f64,
}

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert a new ride; fails with `ActiveRideLimit` if the rider already
    /// has `max_active` rides in an active status.
    async fn insert_ride(&self, ride: &Ride, max_active: u32) -> Result<(), StoreError>;

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError>;

    async fn active_ride_for(
        &self,
        role: PartyRole,
        party_id: Uuid,
    ) -> Result<Option<Ride>, StoreError>;

    async fn count_active_rides(&self, rider_id: Uuid) -> Result<i64, StoreError>;

    /// Newest first
    async fn list_rides(&self, query: &RideQuery) -> Result<Page<Ride>, StoreError>;

    /// PENDING -> CONFIRMED with the captain flipped AVAILABLE -> BUSY.
    async fn assign_captain(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        tracking: &Tracking,
    ) -> Result<AssignOutcome, StoreError>;

    /// Returns `None` when the guard did not match.
    async fn transition(
        &self,
        ride_id: Uuid,
        change: &Transition,
    ) -> Result<Option<Ride>, StoreError>;

    /// Sets a rating slot on a COMPLETED ride if it is still empty.
    async fn record_rating(
        &self,
        ride_id: Uuid,
        slot: RatingSlot,
        rating: &Rating,
    ) -> Result<Option<Ride>, StoreError>;

    /// Mean of the slot's values over the rated party's completed rides.
    async fn average_rating(
        &self,
        slot: RatingSlot,
        rated_party: Uuid,
    ) -> Result<Option<f64>, StoreError>;

    /// Updates ride tracking and the captain's own position together.
    async fn record_captain_location(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>, StoreError>;
}

#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn insert_rider(&self, rider: &Rider) -> Result<(), StoreError>;
    async fn rider_by_id(&self, id: Uuid) -> Result<Option<Rider>, StoreError>;
    async fn rider_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError>;
    async fn soft_delete_rider(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_rider_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError>;

    async fn insert_captain(&self, captain: &Captain) -> Result<(), StoreError>;
    async fn captain_by_id(&self, id: Uuid) -> Result<Option<Captain>, StoreError>;
    async fn captain_by_email(&self, email: &str) -> Result<Option<Captain>, StoreError>;
    async fn set_captain_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError>;

    /// Conditional status change; `None` if the captain's status is not in `from`.
    async fn set_captain_status(
        &self,
        id: Uuid,
        from: &[CaptainStatus],
        to: CaptainStatus,
    ) -> Result<Option<Captain>, StoreError>;

    async fn set_captain_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Captain>, StoreError>;

    /// AVAILABLE captains within `radius_meters`, nearest first.
    async fn nearby_captains(
        &self,
        point: GeoPoint,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyCaptain>, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Appends and drops the party's oldest entries beyond `retention`.
    async fn append(&self, notification: &Notification, retention: usize)
        -> Result<(), StoreError>;

    /// Oldest first
    async fn unread(&self, party_id: Uuid) -> Result<Vec<Notification>, StoreError>;

    /// `false` when the notification does not belong to the party.
    async fn mark_read(&self, party_id: Uuid, notification_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Idempotent
    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn is_revoked(&self, token_hash: &str) -> Result<bool, StoreError>;
    async fn purge_revoked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// The set of stores the services run against
#[derive(Clone)]
pub struct Persistence {
    pub rides: Arc<dyn RideStore>,
    pub parties: Arc<dyn PartyStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Persistence {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            rides: store.clone(),
            parties: store.clone(),
            notifications: store.clone(),
            tokens: store,
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            rides: store.clone(),
            parties: store.clone(),
            notifications: store.clone(),
            tokens: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions_build() {
        for (from, to) in [
            (RideStatus::Confirmed, RideStatus::Started),
            (RideStatus::Started, RideStatus::Completed),
            (RideStatus::Pending, RideStatus::Cancelled),
            (RideStatus::Confirmed, RideStatus::Cancelled),
        ] {
            let change = Transition::new(from, to);
            assert_eq!((change.from, change.to), (from, to));
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal ride transition")]
    fn test_illegal_transition_rejected() {
        Transition::new(RideStatus::Started, RideStatus::Cancelled);
    }
}
