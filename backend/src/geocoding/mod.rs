//! Maps collaborator: address lookup, route metrics and place suggestions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::GeoPoint;
use crate::ride::RouteMetrics;

pub mod google;
pub mod offline;
pub mod service;

pub use google::GoogleMapsGeocoder;
pub use offline::OfflineGeocoder;
pub use service::MapsService;

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Maps provider timed out")]
    Timeout,

    #[error("Maps provider error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for GeocodingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeocodingError::Timeout
        } else {
            GeocodingError::Upstream(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub description: String,
    pub place_id: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn coordinates(&self, address: &str) -> Result<GeoPoint, GeocodingError>;

    async fn route_metrics(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteMetrics, GeocodingError>;

    async fn autocomplete(&self, input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError>;
}
