//! WebSocket gateway for live ride notifications
//!
//! Each party holds at most one live connection. Connecting again replaces
//! the previous socket, which is closed once its channel is dropped.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::middleware::AuthenticatedParty;
use crate::models::{GeoPoint, PartyRole};
use crate::notification::{Notification, PushTransport};
use crate::state::AppState;

const CHANNEL_CAPACITY: usize = 32;

/// Registry of live connections keyed by party id
#[derive(Clone)]
pub struct WsState {
    connections: Arc<RwLock<HashMap<Uuid, Connection>>>,
    push_timeout: Duration,
}

struct Connection {
    connection_id: Uuid,
    tx: mpsc::Sender<ServerMessage>,
}

/// Client message types
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Ping,
    LocationUpdate { ride_id: Uuid, location: GeoPoint },
    MarkRead { notification_id: Uuid },
}

/// Server message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Connected { party_id: Uuid, role: PartyRole },
    Notification { notification: Notification },
    Pong,
    Error { message: String },
}

impl WsState {
    pub fn new(push_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            push_timeout,
        }
    }

    /// Register a connection for `party_id`, replacing any previous one.
    pub async fn connect(&self, party_id: Uuid) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connection_id = Uuid::new_v4();

        let previous = self
            .connections
            .write()
            .await
            .insert(party_id, Connection { connection_id, tx });

        if let Some(previous) = previous {
            tracing::info!(
                party_id = %party_id,
                replaced = %previous.connection_id,
                "Replacing existing connection"
            );
        }
        (connection_id, rx)
    }

    /// Remove the party's connection if it is still `connection_id`.
    pub async fn disconnect(&self, party_id: Uuid, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&party_id) {
            Some(current) if current.connection_id == connection_id => {
                connections.remove(&party_id);
                tracing::info!(party_id = %party_id, "Client disconnected");
                true
            }
            _ => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Deliver to the party's live connection; `false` if offline or stalled.
    pub async fn send(&self, party_id: Uuid, message: ServerMessage) -> bool {
        let tx = match self.connections.read().await.get(&party_id) {
            Some(connection) => connection.tx.clone(),
            None => return false,
        };

        match tx.send_timeout(message, self.push_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(party_id = %party_id, error = %e, "Push dropped");
                false
            }
        }
    }
}

#[async_trait]
impl PushTransport for WsState {
    async fn push_to_party(&self, party_id: Uuid, notification: &Notification) -> bool {
        self.send(
            party_id,
            ServerMessage::Notification {
                notification: notification.clone(),
            },
        )
        .await
    }
}

/// WebSocket handler - authenticates, then upgrades the connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    party: AuthenticatedParty,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, party))
}

async fn handle_socket(socket: WebSocket, state: AppState, party: AuthenticatedParty) {
    let party_id = party.party_id;
    let (connection_id, mut pushes) = state.ws_state.connect(party_id).await;
    tracing::info!(party_id = %party_id, role = party.role.as_str(), "Client connected");

    let (mut sender, mut receiver) = socket.split();

    // Replies to this socket's own requests
    let (reply_tx, mut replies) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);
    let _ = reply_tx
        .send(ServerMessage::Connected {
            party_id,
            role: party.role,
        })
        .await;

    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                pushed = pushes.recv() => match pushed {
                    Some(message) => message,
                    // Replaced by a newer connection
                    None => break,
                },
                Some(reply) = replies.recv() => reply,
            };

            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => handle_client_message(&recv_state, &party, client_msg).await,
                        Err(e) => Some(ServerMessage::Error {
                            message: format!("Unrecognized message: {}", e),
                        }),
                    };
                    if let Some(reply) = reply {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.ws_state.disconnect(party_id, connection_id).await;
}

async fn handle_client_message(
    state: &AppState,
    party: &AuthenticatedParty,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Ping => {
            tracing::debug!(party_id = %party.party_id, "Ping");
            Some(ServerMessage::Pong)
        }
        ClientMessage::LocationUpdate { ride_id, location } => {
            if party.role != PartyRole::Captain {
                return Some(ServerMessage::Error {
                    message: "Only captains can send location updates".to_string(),
                });
            }
            match state
                .ride_service
                .update_captain_location(ride_id, party.party_id, location)
                .await
            {
                Ok(_) => None,
                Err(e) => Some(ServerMessage::Error {
                    message: e.to_string(),
                }),
            }
        }
        ClientMessage::MarkRead { notification_id } => {
            match state
                .notification_service
                .mark_as_read(party.party_id, notification_id)
                .await
            {
                Ok(true) => None,
                Ok(false) => Some(ServerMessage::Error {
                    message: "Notification not found".to_string(),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to mark notification read");
                    Some(ServerMessage::Error {
                        message: "Notification store unavailable".to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(party_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            party_id,
            party_role: PartyRole::Rider,
            event_type: "RIDE_STARTED".to_string(),
            message: "Your ride has started.".to_string(),
            payload: serde_json::json!({}),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_to_offline_party() {
        let ws = WsState::new(Duration::from_millis(50));
        let party_id = Uuid::new_v4();
        assert!(!ws.push_to_party(party_id, &notification(party_id)).await);
    }

    #[tokio::test]
    async fn test_latest_connection_wins() {
        let ws = WsState::new(Duration::from_millis(50));
        let party_id = Uuid::new_v4();

        let (first_id, mut first) = ws.connect(party_id).await;
        let (second_id, mut second) = ws.connect(party_id).await;
        assert_ne!(first_id, second_id);

        // The replaced channel is closed
        assert!(first.recv().await.is_none());

        assert!(ws.push_to_party(party_id, &notification(party_id)).await);
        assert!(matches!(
            second.recv().await,
            Some(ServerMessage::Notification { .. })
        ));

        // A stale disconnect leaves the live connection alone
        assert!(!ws.disconnect(party_id, first_id).await);
        assert_eq!(ws.connection_count().await, 1);

        assert!(ws.disconnect(party_id, second_id).await);
        assert_eq!(ws.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_stalled_connection_times_out() {
        let ws = WsState::new(Duration::from_millis(10));
        let party_id = Uuid::new_v4();
        let (_id, _rx) = ws.connect(party_id).await;

        for _ in 0..CHANNEL_CAPACITY {
            assert!(ws.push_to_party(party_id, &notification(party_id)).await);
        }
        assert!(!ws.push_to_party(party_id, &notification(party_id)).await);
    }

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"LocationUpdate","ride_id":"00000000-0000-0000-0000-000000000001","location":{"lat":12.9,"lng":77.6}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::LocationUpdate { .. }));
    }
}
