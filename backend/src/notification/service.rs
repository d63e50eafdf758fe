//! Notification dispatcher: durable log first, live push second

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::model::{Notification, RideEvent};
use crate::models::PartyRole;
use crate::store::{NotificationStore, StoreError};

/// Live delivery channel to a connected party
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// `true` if the notification was handed to a live connection.
    async fn push_to_party(&self, party_id: Uuid, notification: &Notification) -> bool;
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn PushTransport>,
    retention: usize,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn PushTransport>,
        retention: usize,
    ) -> Self {
        Self {
            store,
            transport,
            retention: retention.max(1),
        }
    }

    /// Record the event in the party's log and push it if they are online.
    ///
    /// Being offline or a failed push is not an error; only the log append can fail.
    pub async fn notify(
        &self,
        party_id: Uuid,
        role: PartyRole,
        event: &RideEvent,
    ) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            party_id,
            party_role: role,
            event_type: event.event_type().to_string(),
            message: event.message_for(role),
            payload: serde_json::to_value(event)?,
            read: false,
            created_at: Utc::now(),
        };

        self.store.append(&notification, self.retention).await?;

        let delivered = self.transport.push_to_party(party_id, &notification).await;
        tracing::debug!(
            party_id = %party_id,
            role = role.as_str(),
            event_type = %notification.event_type,
            ride_id = %event.ride_id(),
            delivered,
            "Notification dispatched"
        );

        Ok(notification)
    }

    pub async fn unread(&self, party_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        self.store.unread(party_id).await
    }

    /// Idempotent; `false` if the notification does not belong to the party.
    pub async fn mark_as_read(
        &self,
        party_id: Uuid,
        notification_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.store.mark_read(party_id, notification_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        online: bool,
        pushed: Mutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn push_to_party(&self, party_id: Uuid, notification: &Notification) -> bool {
            if !self.online {
                return false;
            }
            self.pushed
                .lock()
                .await
                .push((party_id, notification.event_type.clone()));
            true
        }
    }

    fn started(ride_id: Uuid) -> RideEvent {
        RideEvent::RideStarted {
            ride_id,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_offline_party_still_gets_log_entry() {
        let transport = Arc::new(RecordingTransport::default());
        let service = NotificationService::new(Arc::new(MemoryStore::new()), transport, 100);
        let rider = Uuid::new_v4();

        let notification = service
            .notify(rider, PartyRole::Rider, &started(Uuid::new_v4()))
            .await
            .unwrap();

        let unread = service.unread(rider).await.unwrap();
        assert_eq!(unread, vec![notification]);
        assert_eq!(unread[0].message, "Your ride has started! Enjoy your trip.");
    }

    #[tokio::test]
    async fn test_online_party_gets_push() {
        let transport = Arc::new(RecordingTransport {
            online: true,
            ..Default::default()
        });
        let service =
            NotificationService::new(Arc::new(MemoryStore::new()), transport.clone(), 100);
        let rider = Uuid::new_v4();

        service
            .notify(rider, PartyRole::Rider, &started(Uuid::new_v4()))
            .await
            .unwrap();

        let pushed = transport.pushed.lock().await;
        assert_eq!(pushed.as_slice(), &[(rider, "RIDE_STARTED".to_string())]);
    }

    #[tokio::test]
    async fn test_mark_as_read() {
        let service = NotificationService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingTransport::default()),
            100,
        );
        let rider = Uuid::new_v4();
        let n = service
            .notify(rider, PartyRole::Rider, &started(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(!service.mark_as_read(Uuid::new_v4(), n.id).await.unwrap());
        assert!(service.mark_as_read(rider, n.id).await.unwrap());
        assert!(service.mark_as_read(rider, n.id).await.unwrap());
        assert!(service.unread(rider).await.unwrap().is_empty());
    }
}
