//! Straight-line fallback used when no maps key is configured.
//!
//! Distances are great-circle scaled by a road factor; durations assume a
//! fixed city speed. Address lookup is not possible offline.

use async_trait::async_trait;

use super::{Geocoder, GeocodingError, PlaceSuggestion};
use crate::models::GeoPoint;
use crate::ride::{Measure, RouteMetrics};

const ROAD_FACTOR: f64 = 1.3;
const CITY_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone, Default)]
pub struct OfflineGeocoder;

impl OfflineGeocoder {
    pub fn new() -> Self {
        Self
    }

    /// Accepts `"lat,lng"` in place of an address.
    fn parse_coordinates(input: &str) -> Option<GeoPoint> {
        let (lat, lng) = input.split_once(',')?;
        let point = GeoPoint::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
        point.is_valid().then_some(point)
    }
}

#[async_trait]
impl Geocoder for OfflineGeocoder {
    async fn coordinates(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
        Self::parse_coordinates(address)
            .ok_or_else(|| GeocodingError::NotFound(address.to_string()))
    }

    async fn route_metrics(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteMetrics, GeocodingError> {
        let meters = (origin.distance_meters(&destination) * ROAD_FACTOR).round();
        let seconds = (meters / 1000.0 / CITY_SPEED_KMH * 3600.0).round();
        Ok(RouteMetrics {
            distance: Measure::meters(meters),
            duration: Measure::seconds(seconds),
        })
    }

    async fn autocomplete(&self, _input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_route_metrics_scale_with_distance() {
        let geocoder = OfflineGeocoder::new();
        let a = GeoPoint::new(12.9, 77.5);
        let b = GeoPoint::new(12.95, 77.6);

        let metrics = geocoder.route_metrics(a, b).await.unwrap();
        assert!(metrics.distance_km() > 12.0);
        // 30 km/h => two minutes per km
        let expected_minutes = metrics.distance_km() * 2.0;
        assert!((metrics.duration_minutes() - expected_minutes).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_coordinates_accepts_lat_lng_only() {
        let geocoder = OfflineGeocoder::new();
        let point = geocoder.coordinates("12.9716, 77.5946").await.unwrap();
        assert_eq!(point, GeoPoint::new(12.9716, 77.5946));

        assert!(matches!(
            geocoder.coordinates("MG Road, Bengaluru").await,
            Err(GeocodingError::NotFound(_))
        ));
    }
}
