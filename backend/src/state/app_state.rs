//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::captain::CaptainService;
use crate::config::{Config, ConfigError};
use crate::geocoding::{Geocoder, MapsService};
use crate::notification::NotificationService;
use crate::ride::{FareCalculator, RidePolicy, RideService};
use crate::store::{Persistence, RideStore};
use crate::websocket::WsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub ride_service: Arc<RideService>,
    pub captain_service: Arc<CaptainService>,
    pub notification_service: Arc<NotificationService>,
    pub maps_service: Arc<MapsService>,
    pub ws_state: WsState,
    /// Used by the health check
    pub store: Arc<dyn RideStore>,
}

impl AppState {
    /// Wire every service against one set of stores and a geocoder.
    pub fn build(
        persistence: Persistence,
        geocoder: Arc<dyn Geocoder>,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        let ws_state = WsState::new(Duration::from_millis(config.push_timeout_ms));

        let notification_service = Arc::new(NotificationService::new(
            persistence.notifications.clone(),
            Arc::new(ws_state.clone()),
            config.notification_retention,
        ));

        let auth_service = Arc::new(AuthService::new(
            persistence.parties.clone(),
            persistence.tokens.clone(),
            config.jwt_secret.clone(),
            config.jwt_ttl_seconds,
            config.bcrypt_cost,
        ));

        let ride_service = Arc::new(RideService::new(
            persistence.rides.clone(),
            persistence.parties.clone(),
            geocoder.clone(),
            notification_service.clone(),
            FareCalculator::from_config(config)?,
            RidePolicy::from_config(config),
        ));

        let captain_service = Arc::new(CaptainService::new(persistence.parties.clone()));

        let maps_service = Arc::new(MapsService::new(
            geocoder,
            Duration::from_millis(config.geocoding_timeout_ms),
        ));

        Ok(Self {
            auth_service,
            ride_service,
            captain_service,
            notification_service,
            maps_service,
            ws_state,
            store: persistence.rides,
        })
    }
}

impl FromRef<AppState> for WsState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ws_state.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<RideService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ride_service.clone()
    }
}

impl FromRef<AppState> for Arc<NotificationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notification_service.clone()
    }
}
