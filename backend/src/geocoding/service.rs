//! Maps lookups for the HTTP layer, bounded by a per-call timeout

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{Geocoder, GeocodingError, PlaceSuggestion};
use crate::models::GeoPoint;
use crate::ride::RouteMetrics;

const MIN_INPUT_LEN: usize = 3;

pub struct MapsService {
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
}

impl MapsService {
    pub fn new(geocoder: Arc<dyn Geocoder>, timeout: Duration) -> Self {
        Self { geocoder, timeout }
    }

    pub async fn coordinates(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
        let address = checked_input("address", address)?;
        self.bounded(self.geocoder.coordinates(address)).await
    }

    /// Geocodes both addresses, then asks for the route between them.
    pub async fn distance_time(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteMetrics, GeocodingError> {
        let origin = checked_input("origin", origin)?;
        let destination = checked_input("destination", destination)?;

        let (from, to) = tokio::try_join!(
            self.bounded(self.geocoder.coordinates(origin)),
            self.bounded(self.geocoder.coordinates(destination)),
        )?;
        self.bounded(self.geocoder.route_metrics(from, to)).await
    }

    pub async fn autocomplete(&self, input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
        let input = checked_input("input", input)?;
        self.bounded(self.geocoder.autocomplete(input)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GeocodingError>>,
    ) -> Result<T, GeocodingError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GeocodingError::Timeout)?
    }
}

fn checked_input<'a>(field: &str, value: &'a str) -> Result<&'a str, GeocodingError> {
    let value = value.trim();
    if value.chars().count() < MIN_INPUT_LEN {
        return Err(GeocodingError::InvalidInput(format!(
            "{} must be at least {} characters",
            field, MIN_INPUT_LEN
        )));
    }
    Ok(value)
}
