//! Google Maps web services adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Geocoder, GeocodingError, PlaceSuggestion};
use crate::models::GeoPoint;
use crate::ride::{Measure, MeasureUnit, RouteMetrics};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: GeoPoint,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    status: String,
    #[serde(default)]
    predictions: Vec<Prediction>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    description: String,
    place_id: Option<String>,
}

fn check_status(status: &str, error_message: Option<String>) -> Result<(), GeocodingError> {
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" | "NOT_FOUND" => Err(GeocodingError::NotFound(status.to_string())),
        "INVALID_REQUEST" => Err(GeocodingError::InvalidInput(
            error_message.unwrap_or_else(|| status.to_string()),
        )),
        other => Err(GeocodingError::Upstream(format!(
            "{}: {}",
            other,
            error_message.unwrap_or_default()
        ))),
    }
}

/// Geocoder backed by the Geocoding, Distance Matrix and Places APIs
#[derive(Clone)]
pub struct GoogleMapsGeocoder {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleMapsGeocoder {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Geocoder for GoogleMapsGeocoder {
    async fn coordinates(&self, address: &str) -> Result<GeoPoint, GeocodingError> {
        let response: GeocodeResponse = self
            .client
            .get(self.url("geocode/json"))
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        check_status(&response.status, response.error_message)?;
        response
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)
            .ok_or_else(|| GeocodingError::NotFound(address.to_string()))
    }

    async fn route_metrics(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteMetrics, GeocodingError> {
        let origins = format!("{},{}", origin.lat, origin.lng);
        let destinations = format!("{},{}", destination.lat, destination.lng);

        let response: DistanceMatrixResponse = self
            .client
            .get(self.url("distancematrix/json"))
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        check_status(&response.status, response.error_message)?;

        let element = response
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| GeocodingError::NotFound("route".to_string()))?;
        check_status(&element.status, None)?;

        match (element.distance, element.duration) {
            (Some(distance), Some(duration)) => Ok(RouteMetrics {
                distance: Measure {
                    value: distance.value,
                    unit: MeasureUnit::Meters,
                    text: distance.text,
                },
                duration: Measure {
                    value: duration.value,
                    unit: MeasureUnit::Seconds,
                    text: duration.text,
                },
            }),
            _ => Err(GeocodingError::NotFound("route".to_string())),
        }
    }

    async fn autocomplete(&self, input: &str) -> Result<Vec<PlaceSuggestion>, GeocodingError> {
        let response: AutocompleteResponse = self
            .client
            .get(self.url("place/autocomplete/json"))
            .query(&[("input", input), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status == "ZERO_RESULTS" {
            return Ok(Vec::new());
        }
        check_status(&response.status, response.error_message)?;

        Ok(response
            .predictions
            .into_iter()
            .map(|p| PlaceSuggestion {
                description: p.description,
                place_id: p.place_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(check_status("OK", None).is_ok());
        assert!(matches!(
            check_status("ZERO_RESULTS", None),
            Err(GeocodingError::NotFound(_))
        ));
        assert!(matches!(
            check_status("INVALID_REQUEST", Some("missing origin".to_string())),
            Err(GeocodingError::InvalidInput(msg)) if msg == "missing origin"
        ));
        assert!(matches!(
            check_status("OVER_QUERY_LIMIT", None),
            Err(GeocodingError::Upstream(_))
        ));
    }

    #[test]
    fn test_distance_matrix_payload() {
        let raw = r#"{
            "status": "OK",
            "rows": [{ "elements": [{
                "status": "OK",
                "distance": { "text": "6.0 km", "value": 6000 },
                "duration": { "text": "18 mins", "value": 1080 }
            }]}]
        }"#;
        let response: DistanceMatrixResponse = serde_json::from_str(raw).unwrap();
        let element = &response.rows[0].elements[0];
        assert_eq!(element.distance.as_ref().unwrap().value, 6000.0);
        assert_eq!(element.duration.as_ref().unwrap().text, "18 mins");
    }

    #[test]
    fn test_url_join() {
        let geocoder = GoogleMapsGeocoder::new("key", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(
            geocoder.url("geocode/json"),
            "http://localhost:9999/geocode/json"
        );
    }
}
