//! Maps proxy handlers

use axum::{
    extract::{Query, State},
    Json,
};
use validator::Validate;

use super::AuthenticatedParty;
use crate::error::ApiResult;
use crate::geocoding::PlaceSuggestion;
use crate::models::{
    ApiResponse, AutocompleteQuery, CoordinatesQuery, DistanceTimeQuery, GeoPoint,
};
use crate::ride::RouteMetrics;
use crate::state::AppState;

/// GET /maps/coordinates?address=
pub async fn coordinates(
    State(state): State<AppState>,
    _party: AuthenticatedParty,
    Query(query): Query<CoordinatesQuery>,
) -> ApiResult<Json<ApiResponse<GeoPoint>>> {
    query.validate()?;
    let point = state.maps_service.coordinates(&query.address).await?;
    Ok(Json(ApiResponse::ok(point)))
}

/// GET /maps/distance-time?origin=&destination=
pub async fn distance_time(
    State(state): State<AppState>,
    _party: AuthenticatedParty,
    Query(query): Query<DistanceTimeQuery>,
) -> ApiResult<Json<ApiResponse<RouteMetrics>>> {
    query.validate()?;
    let route = state
        .maps_service
        .distance_time(&query.origin, &query.destination)
        .await?;
    Ok(Json(ApiResponse::ok(route)))
}

/// GET /maps/autocomplete?input=
pub async fn autocomplete(
    State(state): State<AppState>,
    _party: AuthenticatedParty,
    Query(query): Query<AutocompleteQuery>,
) -> ApiResult<Json<ApiResponse<Vec<PlaceSuggestion>>>> {
    query.validate()?;
    let suggestions = state.maps_service.autocomplete(&query.input).await?;
    Ok(Json(ApiResponse::ok(suggestions)))
}
