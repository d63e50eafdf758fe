//! In-process store used for local development and tests.
//!
//! All tables sit behind one `RwLock`, so every multi-record change is
//! applied under a single write guard.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AssignOutcome, NearbyCaptain, NotificationStore, Page, PartyStore, RideQuery, RideStore,
    StoreError, TokenStore, Transition,
};
use crate::models::{Captain, CaptainStatus, GeoPoint, PartyRole, Rider};
use crate::notification::Notification;
use crate::ride::{Rating, RatingSlot, Ride, RideStatus, Tracking};

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    riders: HashMap<Uuid, Rider>,
    captains: HashMap<Uuid, Captain>,
    notifications: HashMap<Uuid, VecDeque<Notification>>,
    revoked_tokens: HashMap<String, DateTime<Utc>>,
}

impl Tables {
    fn release_captain(&mut self, captain_id: Uuid, now: DateTime<Utc>) {
        if let Some(captain) = self.captains.get_mut(&captain_id) {
            if captain.status == CaptainStatus::Busy {
                captain.status = CaptainStatus::Available;
                captain.updated_at = now;
            }
        }
    }

    fn party_rides(&self, role: PartyRole, party_id: Uuid) -> impl Iterator<Item = &Ride> {
        self.rides.values().filter(move |ride| match role {
            PartyRole::Rider => ride.rider_id == party_id,
            PartyRole::Captain => ride.captain_id == Some(party_id),
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_ride(&self, ride: &Ride, max_active: u32) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let active = tables
            .party_rides(PartyRole::Rider, ride.rider_id)
            .filter(|existing| existing.status.is_active())
            .count();
        if active >= max_active as usize {
            return Err(StoreError::ActiveRideLimit);
        }
        if tables.rides.contains_key(&ride.id) {
            return Err(StoreError::Duplicate(format!("ride {}", ride.id)));
        }
        tables.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> Result<Option<Ride>, StoreError> {
        Ok(self.tables.read().await.rides.get(&id).cloned())
    }

    async fn active_ride_for(
        &self,
        role: PartyRole,
        party_id: Uuid,
    ) -> Result<Option<Ride>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .party_rides(role, party_id)
            .filter(|ride| ride.status.is_active())
            .max_by_key(|ride| ride.created_at)
            .cloned())
    }

    async fn count_active_rides(&self, rider_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .party_rides(PartyRole::Rider, rider_id)
            .filter(|ride| ride.status.is_active())
            .count() as i64)
    }

    async fn list_rides(&self, query: &RideQuery) -> Result<Page<Ride>, StoreError> {
        let tables = self.tables.read().await;
        let mut rides: Vec<Ride> = tables
            .party_rides(query.role, query.party_id)
            .filter(|ride| query.status.map_or(true, |status| ride.status == status))
            .cloned()
            .collect();
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rides.len() as i64;
        let items = rides
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn assign_captain(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        tracking: &Tracking,
    ) -> Result<AssignOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        match tables.rides.get(&ride_id) {
            Some(ride) if ride.status == RideStatus::Pending => {}
            _ => return Ok(AssignOutcome::RideNotPending),
        }
        match tables.captains.get_mut(&captain_id) {
            Some(captain) if captain.status == CaptainStatus::Available => {
                captain.status = CaptainStatus::Busy;
                captain.updated_at = now;
            }
            _ => return Ok(AssignOutcome::CaptainNotAvailable),
        }

        let ride = tables
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| StoreError::Corrupt(format!("ride {} vanished", ride_id)))?;
        ride.captain_id = Some(captain_id);
        ride.status = RideStatus::Confirmed;
        ride.tracking.merge(tracking);
        ride.updated_at = now;
        Ok(AssignOutcome::Assigned(ride.clone()))
    }

    async fn transition(
        &self,
        ride_id: Uuid,
        change: &Transition,
    ) -> Result<Option<Ride>, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        if ride.status != change.from {
            return Ok(None);
        }
        if let Some(expected) = change.expected_captain {
            if ride.captain_id != Some(expected) {
                return Ok(None);
            }
        }

        ride.status = change.to;
        ride.tracking.merge(&change.tracking);
        if change.verify_otp {
            ride.otp.verified = true;
        }
        if let Some(cancellation) = &change.cancellation {
            ride.cancellation = Some(cancellation.clone());
        }
        ride.updated_at = now;
        let updated = ride.clone();

        if let Some(captain_id) = change.release_captain {
            tables.release_captain(captain_id, now);
        }
        Ok(Some(updated))
    }

    async fn record_rating(
        &self,
        ride_id: Uuid,
        slot: RatingSlot,
        rating: &Rating,
    ) -> Result<Option<Ride>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        if ride.status != RideStatus::Completed || ride.rating(slot).is_some() {
            return Ok(None);
        }
        *ride.rating_mut(slot) = Some(rating.clone());
        ride.updated_at = Utc::now();
        Ok(Some(ride.clone()))
    }

    async fn average_rating(
        &self,
        slot: RatingSlot,
        rated_party: Uuid,
    ) -> Result<Option<f64>, StoreError> {
        let tables = self.tables.read().await;
        // Riders rate captains; captains rate riders.
        let rated_role = match slot {
            RatingSlot::ByRider => PartyRole::Captain,
            RatingSlot::ByCaptain => PartyRole::Rider,
        };
        let values: Vec<f64> = tables
            .party_rides(rated_role, rated_party)
            .filter(|ride| ride.status == RideStatus::Completed)
            .filter_map(|ride| ride.rating(slot).map(|r| f64::from(r.value)))
            .collect();

        if values.is_empty() {
            Ok(None)
        } else {
            Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
        }
    }

    async fn record_captain_location(
        &self,
        ride_id: Uuid,
        captain_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(ride) = tables.rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        let tracked = matches!(ride.status, RideStatus::Confirmed | RideStatus::Started);
        if !tracked || ride.captain_id != Some(captain_id) {
            return Ok(None);
        }
        ride.tracking.captain_location = Some(location);
        ride.tracking.captain_location_updated_at = Some(at);
        ride.updated_at = at;
        let updated = ride.clone();

        if let Some(captain) = tables.captains.get_mut(&captain_id) {
            captain.latitude = Some(location.lat);
            captain.longitude = Some(location.lng);
            captain.location_updated_at = Some(at);
        }
        Ok(Some(updated))
    }
}

#[async_trait]
impl PartyStore for MemoryStore {
    async fn insert_rider(&self, rider: &Rider) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.riders.values().any(|r| r.email == rider.email) {
            return Err(StoreError::Duplicate(format!("rider {}", rider.email)));
        }
        tables.riders.insert(rider.id, rider.clone());
        Ok(())
    }

    async fn rider_by_id(&self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        Ok(self.tables.read().await.riders.get(&id).cloned())
    }

    async fn rider_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.riders.values().find(|r| r.email == email).cloned())
    }

    async fn soft_delete_rider(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.riders.get_mut(&id) {
            Some(rider) if !rider.deleted => {
                rider.deleted = true;
                rider.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_rider_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError> {
        if let Some(rider) = self.tables.write().await.riders.get_mut(&id) {
            rider.rating = rating;
            rider.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_captain(&self, captain: &Captain) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.captains.values().any(|c| c.email == captain.email) {
            return Err(StoreError::Duplicate(format!("captain {}", captain.email)));
        }
        tables.captains.insert(captain.id, captain.clone());
        Ok(())
    }

    async fn captain_by_id(&self, id: Uuid) -> Result<Option<Captain>, StoreError> {
        Ok(self.tables.read().await.captains.get(&id).cloned())
    }

    async fn captain_by_email(&self, email: &str) -> Result<Option<Captain>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.captains.values().find(|c| c.email == email).cloned())
    }

    async fn set_captain_rating(&self, id: Uuid, rating: Option<f64>) -> Result<(), StoreError> {
        if let Some(captain) = self.tables.write().await.captains.get_mut(&id) {
            captain.rating = rating;
            captain.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_captain_status(
        &self,
        id: Uuid,
        from: &[CaptainStatus],
        to: CaptainStatus,
    ) -> Result<Option<Captain>, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.captains.get_mut(&id) {
            Some(captain) if from.contains(&captain.status) => {
                captain.status = to;
                captain.updated_at = Utc::now();
                Ok(Some(captain.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_captain_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Option<Captain>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.captains.get_mut(&id).map(|captain| {
            captain.latitude = Some(location.lat);
            captain.longitude = Some(location.lng);
            captain.location_updated_at = Some(at);
            captain.updated_at = at;
            captain.clone()
        }))
    }

    async fn nearby_captains(
        &self,
        point: GeoPoint,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyCaptain>, StoreError> {
        let tables = self.tables.read().await;
        let mut nearby: Vec<NearbyCaptain> = tables
            .captains
            .values()
            .filter(|captain| captain.status == CaptainStatus::Available)
            .filter_map(|captain| {
                let distance = captain.location()?.distance_meters(&point);
                (distance <= radius_meters).then(|| NearbyCaptain {
                    captain: captain.clone(),
                    distance_meters: distance,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        nearby.truncate(limit);
        Ok(nearby)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn append(
        &self,
        notification: &Notification,
        retention: usize,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let log = tables
            .notifications
            .entry(notification.party_id)
            .or_default();
        log.push_back(notification.clone());
        while log.len() > retention.max(1) {
            log.pop_front();
        }
        Ok(())
    }

    async fn unread(&self, party_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .get(&party_id)
            .map(|log| log.iter().filter(|n| !n.read).cloned().collect())
            .unwrap_or_default())
    }

    async fn mark_read(&self, party_id: Uuid, notification_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let found = tables
            .notifications
            .get_mut(&party_id)
            .and_then(|log| log.iter_mut().find(|n| n.id == notification_id));
        match found {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn revoke(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .revoked_tokens
            .entry(token_hash.to_string())
            .or_insert(at);
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .revoked_tokens
            .contains_key(token_hash))
    }

    async fn purge_revoked_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.revoked_tokens.len();
        tables.revoked_tokens.retain(|_, revoked_at| *revoked_at >= cutoff);
        Ok((before - tables.revoked_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn notification(party_id: Uuid, n: usize) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            party_id,
            party_role: PartyRole::Rider,
            event_type: "RIDE_STARTED".to_string(),
            message: format!("message {}", n),
            payload: serde_json::json!({ "n": n }),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_notification_retention_drops_oldest() {
        let store = MemoryStore::new();
        let party = Uuid::new_v4();
        for n in 0..5 {
            store.append(&notification(party, n), 3).await.unwrap();
        }

        let unread = store.unread(party).await.unwrap();
        let messages: Vec<&str> = unread.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_party() {
        let store = MemoryStore::new();
        let party = Uuid::new_v4();
        let other = Uuid::new_v4();
        let n = notification(party, 0);
        store.append(&n, 10).await.unwrap();

        assert!(!store.mark_read(other, n.id).await.unwrap());
        assert!(store.mark_read(party, n.id).await.unwrap());
        // Idempotent
        assert!(store.mark_read(party, n.id).await.unwrap());
        assert!(store.unread(party).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_token_purge() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.revoke("old", now - Duration::hours(25)).await.unwrap();
        store.revoke("fresh", now).await.unwrap();

        let purged = store
            .purge_revoked_before(now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(!store.is_revoked("old").await.unwrap());
        assert!(store.is_revoked("fresh").await.unwrap());
    }
}
