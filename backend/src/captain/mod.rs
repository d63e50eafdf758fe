//! Captain availability and position

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Captain, CaptainStatus, GeoPoint};
use crate::ride::RideError;
use crate::store::PartyStore;

/// Statuses a captain may switch between on their own
const SELF_SERVICE: [CaptainStatus; 2] = [CaptainStatus::Available, CaptainStatus::Inactive];

pub struct CaptainService {
    parties: Arc<dyn PartyStore>,
}

impl CaptainService {
    pub fn new(parties: Arc<dyn PartyStore>) -> Self {
        Self { parties }
    }

    /// Go online (AVAILABLE) or offline (INACTIVE). Refused while BUSY or BANNED.
    pub async fn set_availability(
        &self,
        captain_id: Uuid,
        status: CaptainStatus,
    ) -> Result<Captain, RideError> {
        if !SELF_SERVICE.contains(&status) {
            return Err(RideError::Validation(
                "status must be AVAILABLE or INACTIVE".to_string(),
            ));
        }

        if let Some(captain) = self
            .parties
            .set_captain_status(captain_id, &SELF_SERVICE, status)
            .await?
        {
            tracing::info!(captain_id = %captain_id, status = ?status, "Captain availability changed");
            return Ok(captain);
        }

        match self.parties.captain_by_id(captain_id).await? {
            Some(captain) => Err(RideError::InvalidTransition {
                action: "change availability",
                status: status_label(captain.status),
            }),
            None => Err(RideError::NotFound("Captain")),
        }
    }

    /// Current position, used when matching ride requests.
    pub async fn update_position(
        &self,
        captain_id: Uuid,
        location: GeoPoint,
    ) -> Result<Captain, RideError> {
        if !location.is_valid() {
            return Err(RideError::Validation("invalid coordinates".to_string()));
        }

        self.parties
            .set_captain_location(captain_id, location, Utc::now())
            .await?
            .ok_or(RideError::NotFound("Captain"))
    }
}

fn status_label(status: CaptainStatus) -> &'static str {
    match status {
        CaptainStatus::Available => "AVAILABLE",
        CaptainStatus::Busy => "BUSY",
        CaptainStatus::Inactive => "INACTIVE",
        CaptainStatus::Banned => "BANNED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Vehicle, VehicleType};
    use crate::store::MemoryStore;

    async fn captain_with_status(store: &MemoryStore, status: CaptainStatus) -> Uuid {
        let now = Utc::now();
        let captain = Captain {
            id: Uuid::new_v4(),
            first_name: "Ravi".to_string(),
            last_name: "Kumar".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone: None,
            password_hash: "x".to_string(),
            vehicle: Vehicle {
                vehicle_type: VehicleType::Standard,
                model: "Swift".to_string(),
                plate: "KA01AB1234".to_string(),
                color: "White".to_string(),
                capacity: 4,
                year: 2020,
            },
            status,
            latitude: None,
            longitude: None,
            location_updated_at: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_captain(&captain).await.unwrap();
        captain.id
    }

    #[tokio::test]
    async fn test_go_online_and_offline() {
        let store = MemoryStore::new();
        let id = captain_with_status(&store, CaptainStatus::Inactive).await;
        let captains = CaptainService::new(Arc::new(store));

        let captain = captains
            .set_availability(id, CaptainStatus::Available)
            .await
            .unwrap();
        assert_eq!(captain.status, CaptainStatus::Available);

        let captain = captains
            .set_availability(id, CaptainStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(captain.status, CaptainStatus::Inactive);
    }

    #[tokio::test]
    async fn test_busy_captain_cannot_go_offline() {
        let store = MemoryStore::new();
        let id = captain_with_status(&store, CaptainStatus::Busy).await;
        let captains = CaptainService::new(Arc::new(store));

        let result = captains.set_availability(id, CaptainStatus::Inactive).await;
        assert!(matches!(result, Err(RideError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_cannot_self_assign_busy() {
        let store = MemoryStore::new();
        let id = captain_with_status(&store, CaptainStatus::Available).await;
        let captains = CaptainService::new(Arc::new(store));

        let result = captains.set_availability(id, CaptainStatus::Busy).await;
        assert!(matches!(result, Err(RideError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_position() {
        let store = MemoryStore::new();
        let id = captain_with_status(&store, CaptainStatus::Available).await;
        let captains = CaptainService::new(Arc::new(store));

        let captain = captains
            .update_position(id, GeoPoint::new(12.97, 77.59))
            .await
            .unwrap();
        assert_eq!(captain.location(), Some(GeoPoint::new(12.97, 77.59)));

        assert!(captains
            .update_position(id, GeoPoint::new(100.0, 0.0))
            .await
            .is_err());
    }
}
