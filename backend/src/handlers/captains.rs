//! Captain self-service handlers

use axum::{extract::State, Json};
use validator::Validate;

use super::CaptainParty;
use crate::error::ApiResult;
use crate::models::{ApiResponse, CaptainResponse, CaptainStatusRequest, LocationRequest};
use crate::state::AppState;

/// PATCH /captains/me/status - Go online or offline
pub async fn update_status(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Json(req): Json<CaptainStatusRequest>,
) -> ApiResult<Json<ApiResponse<CaptainResponse>>> {
    let updated = state
        .captain_service
        .set_availability(captain.party_id, req.status)
        .await?;
    Ok(Json(ApiResponse::ok(updated.into())))
}

/// PATCH /captains/me/location
pub async fn update_location(
    State(state): State<AppState>,
    CaptainParty(captain): CaptainParty,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<ApiResponse<CaptainResponse>>> {
    req.validate()?;

    let updated = state
        .captain_service
        .update_position(captain.party_id, req.location)
        .await?;
    Ok(Json(ApiResponse::ok(updated.into())))
}
